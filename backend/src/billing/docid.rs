//! Human-readable settlement document identifiers.

use chrono::{Datelike, Utc};
use linehaul_shared::SettlementKind;
use rand::Rng;

/// Mint a document ID of the form `BN-YYYYMM-XXXX` / `DP-YYYYMM-XXXX`.
///
/// The month segment comes from the current date at generation time, not the
/// billing date chosen by the user. The 4-digit suffix is uniform random and
/// not unique by construction; collisions surface as primary-key conflicts
/// and are retried by the settlement writer.
pub fn generate_document_id(kind: SettlementKind) -> String {
    let now = Utc::now();
    let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
    format!("{}-{}{:02}-{:04}", kind.prefix(), now.year(), now.month(), suffix)
}
