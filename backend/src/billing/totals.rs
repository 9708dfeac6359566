//! Per-job billable and payable amounts.

use linehaul_shared::{Job, SettlementKind};
use rust_decimal::Decimal;

use super::extra_costs::{ExtraCost, parse_extra_costs};

/// The two settlement-relevant amounts of a single job, with the normalized
/// extras that produced them. No rounding happens here; rounding is applied
/// once, at the withholding step of the settlement aggregation.
#[derive(Debug, Clone)]
pub struct JobTotals {
    pub customer_amount: Decimal,
    pub driver_amount: Decimal,
    pub extras: Vec<ExtraCost>,
}

impl JobTotals {
    pub fn compute(job: &Job) -> Self {
        let extras = parse_extra_costs(job.extra_costs.as_ref());

        let customer_amount = job.price_cust_total.unwrap_or(Decimal::ZERO)
            + extras.iter().map(|e| e.charge_cust).sum::<Decimal>();
        let driver_amount = job.cost_driver_total.unwrap_or(Decimal::ZERO)
            + extras.iter().map(|e| e.cost_driver).sum::<Decimal>();

        Self {
            customer_amount,
            driver_amount,
            extras,
        }
    }

    pub fn amount_for(&self, kind: SettlementKind) -> Decimal {
        match kind {
            SettlementKind::BillingNote => self.customer_amount,
            SettlementKind::DriverPayment => self.driver_amount,
        }
    }

    /// Extras shown as line items on driver payout documents. Presentation
    /// filter only: the totals above always sum every entry, including zero
    /// and negative ones.
    pub fn driver_line_items(&self) -> Vec<&ExtraCost> {
        self.extras
            .iter()
            .filter(|e| e.cost_driver > Decimal::ZERO)
            .collect()
    }
}
