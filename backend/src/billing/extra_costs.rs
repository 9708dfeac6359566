//! Normalization of the per-job extra-costs payload.
//!
//! The field has accumulated three shapes in production data: a native JSON
//! array, a JSON-encoded string, and a doubly JSON-encoded string left behind
//! by an older save path. A malformed payload on one job must never block the
//! settlement calculation for the rest of the batch, so every failure here
//! degrades to "no extras" and is only logged.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An itemized additional charge attached to a job (tolls, labor, overtime),
/// with independent amounts owed to the driver and charged to the customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraCost {
    #[serde(rename = "type", default)]
    pub cost_type: String,
    #[serde(default)]
    pub cost_driver: Decimal,
    #[serde(default)]
    pub charge_cust: Decimal,
}

/// Maximum number of string-decode passes before giving up. Two passes cover
/// the doubly-encoded legacy shape; anything deeper is treated as garbage.
const MAX_DECODE_ATTEMPTS: usize = 2;

/// Normalize a raw extra-costs field into a list of extra cost records.
///
/// Total and pure: absent, null, malformed, or non-array payloads all yield
/// an empty list. Amounts coerce leniently, so a missing or non-numeric
/// `cost_driver`/`charge_cust` becomes zero rather than an error.
pub fn parse_extra_costs(raw: Option<&Value>) -> Vec<ExtraCost> {
    let Some(value) = raw else {
        return Vec::new();
    };

    match decode_to_array(value) {
        Some(items) => items.iter().map(to_extra_cost).collect(),
        None => Vec::new(),
    }
}

fn decode_to_array(value: &Value) -> Option<Vec<Value>> {
    let mut current = value.clone();
    let mut attempts = 0;

    loop {
        match current {
            Value::Array(items) => return Some(items),
            Value::String(raw) if attempts < MAX_DECODE_ATTEMPTS => {
                attempts += 1;
                match serde_json::from_str::<Value>(&raw) {
                    Ok(next) => current = next,
                    Err(err) => {
                        tracing::warn!("discarding unparseable extra costs payload: {}", err);
                        return None;
                    }
                }
            }
            Value::Null => return None,
            other => {
                tracing::warn!(
                    "discarding extra costs payload of unexpected shape: {}",
                    type_name(&other)
                );
                return None;
            }
        }
    }
}

fn to_extra_cost(item: &Value) -> ExtraCost {
    ExtraCost {
        cost_type: item
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        cost_driver: coerce_amount(item.get("cost_driver")),
        charge_cust: coerce_amount(item.get("charge_cust")),
    }
}

/// Lenient numeric coercion: JSON numbers and numeric strings parse to a
/// decimal, everything else becomes zero.
pub(crate) fn coerce_amount(value: Option<&Value>) -> Decimal {
    match value {
        Some(Value::Number(n)) => n.to_string().parse().unwrap_or(Decimal::ZERO),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(Decimal::ZERO),
        _ => Decimal::ZERO,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
