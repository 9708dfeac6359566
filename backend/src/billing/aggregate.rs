//! Settlement aggregation: subtotal, withholding tax, and net total over a
//! selected set of jobs.

use linehaul_shared::{Job, SettlementKind};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use super::totals::JobTotals;

/// Flat withholding-tax rate applied to every settlement subtotal.
///
/// Fixed at 1% on this path. The tax-invoice feature elsewhere in the system
/// carries selectable rates (0/1/3/5%); settlements deliberately do not, and
/// the two paths are kept divergent.
pub fn withholding_rate() -> Decimal {
    Decimal::new(1, 2)
}

/// Withholding for an already-summed subtotal: 1%, rounded half away from
/// zero to the nearest unit. Applied once to the full sum, never per line.
pub fn withholding_for(subtotal: Decimal) -> Decimal {
    (subtotal * withholding_rate()).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, Serialize)]
pub struct SettlementLine {
    pub job_id: String,
    pub amount: Decimal,
}

/// Totals for a candidate settlement over an ordered job selection.
#[derive(Debug, Clone, Serialize)]
pub struct SettlementTotals {
    pub subtotal: Decimal,
    pub withholding: Decimal,
    pub net_total: Decimal,
    pub job_count: usize,
    pub lines: Vec<SettlementLine>,
}

impl SettlementTotals {
    /// An empty selection yields all-zero totals, not an error; the caller
    /// decides whether an empty settlement is acceptable.
    pub fn compute(jobs: &[Job], kind: SettlementKind) -> Self {
        let lines: Vec<SettlementLine> = jobs
            .iter()
            .map(|job| SettlementLine {
                job_id: job.job_id.clone(),
                amount: JobTotals::compute(job).amount_for(kind),
            })
            .collect();

        let subtotal: Decimal = lines.iter().map(|l| l.amount).sum();
        let withholding = withholding_for(subtotal);

        Self {
            subtotal,
            withholding,
            net_total: subtotal - withholding,
            job_count: lines.len(),
            lines,
        }
    }
}
