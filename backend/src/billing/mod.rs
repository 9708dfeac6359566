//! Billing and settlement engine
//!
//! Selects billable jobs, computes customer/driver amounts including extra
//! charges, aggregates settlement totals with withholding tax, mints document
//! IDs, and persists settlement documents with their job links.

pub mod aggregate;
pub mod docid;
pub mod extra_costs;
pub mod store;
pub mod totals;
pub mod writer;

pub use aggregate::{SettlementTotals, withholding_for};
pub use extra_costs::{ExtraCost, parse_extra_costs};
pub use store::{BillingStore, PgBillingStore, StoreError};
pub use totals::JobTotals;
pub use writer::{BillingError, CreateSettlementRequest, CreatedSettlement};
