use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A unit of transport work, created by dispatch and settled by billing.
///
/// The two settlement links are independent: a job can be billed to a
/// customer and paid out to a driver at the same time, each tracked by its
/// own nullable foreign key. Both links are cleared only by a recall.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub branch_id: Option<String>,
    pub customer_name: Option<String>,
    pub driver_name: Option<String>,
    pub vehicle_reg: Option<String>,
    pub job_date: Option<NaiveDate>,
    pub origin: Option<String>,
    pub destination: Option<String>,
    /// Customer-billable base amount, excluding extras.
    pub price_cust_total: Option<Decimal>,
    /// Driver-payable base amount, excluding extras.
    pub cost_driver_total: Option<Decimal>,
    /// Opaque extra-charge payload. May be a native array, a JSON-encoded
    /// string, or a doubly JSON-encoded string left behind by older save
    /// paths; normalized by the billing engine, never read directly.
    pub extra_costs: Option<serde_json::Value>,
    pub billing_note_id: Option<String>,
    pub driver_payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Job {
    /// The settlement link for the given direction, if the job is settled.
    pub fn settlement_link(&self, kind: SettlementKind) -> Option<&str> {
        match kind {
            SettlementKind::BillingNote => self.billing_note_id.as_deref(),
            SettlementKind::DriverPayment => self.driver_payment_id.as_deref(),
        }
    }
}

/// The two settlement directions: customer-facing billing notes and
/// driver-facing payment documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementKind {
    BillingNote,
    DriverPayment,
}

impl SettlementKind {
    /// Document ID prefix: `BN-YYYYMM-XXXX` / `DP-YYYYMM-XXXX`.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::BillingNote => "BN",
            Self::DriverPayment => "DP",
        }
    }

    /// Who the document is addressed to.
    pub fn counterparty_label(&self) -> &'static str {
        match self {
            Self::BillingNote => "customer",
            Self::DriverPayment => "driver",
        }
    }
}

/// A settlement document: either a billing note or a driver payment.
///
/// `total_amount` stores the pre-withholding subtotal of the linked jobs;
/// withholding and net total are recomputed wherever the document is
/// displayed, never persisted. Jobs reference the document from their side,
/// so "jobs in this settlement" is a reverse lookup on the jobs table.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementDocument {
    pub id: String,
    pub counterparty_name: String,
    pub billing_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub branch_id: Option<String>,
    pub total_amount: Decimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}
