use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Response},
};

use super::AuthContext;
use super::jwt;
use crate::error::AppError;

/// Authenticated caller extractor.
///
/// Pulls the bearer token from the Authorization header, verifies it, and
/// exposes the caller's identity, role, and branch scope to handlers. No
/// database round trip: the claims are the source of truth here.
#[derive(Debug, Clone)]
pub struct AuthUser(pub AuthContext);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|header| header.to_str().ok())
            .ok_or_else(|| {
                AppError::Unauthorized("Missing authorization header".to_string()).into_response()
            })?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::Unauthorized("Invalid authorization format".to_string()).into_response()
        })?;

        let token_data = jwt::verify_jwt(token).map_err(|e| AppError::from(e).into_response())?;

        Ok(AuthUser(token_data.claims.into_context()))
    }
}
