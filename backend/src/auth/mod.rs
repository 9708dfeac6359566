//! Authentication seam.
//!
//! The settlement engine treats authorization as an external capability: it
//! only ever asks "is this caller a super admin" and "which branch is this
//! caller scoped to". Both answers come from the verified JWT claims; user
//! management, roles, and sessions live outside this service.

pub mod jwt;
pub mod middleware;

pub use middleware::AuthUser;

/// Caller identity as the engine sees it.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub name: String,
    pub role: String,
    pub branch_id: Option<String>,
}

impl AuthContext {
    pub fn is_super_admin(&self) -> bool {
        self.role == "admin"
    }

    /// Branch filter for listings: `None` means unrestricted. Super admins
    /// see every branch; everyone else is pinned to their own.
    pub fn branch_scope(&self) -> Option<&str> {
        if self.is_super_admin() {
            None
        } else {
            self.branch_id.as_deref()
        }
    }
}
