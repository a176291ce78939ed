// src/history/normalizer.rs

use serde_json::Value;
use tracing::trace;

use crate::types::{RawEvent, TransactionCategory, TransactionEvent};

const TYPE_FIELD: &str = "type";
const TIMESTAMP_FIELD: &str = "timestamp";

/// Stamps a raw record with its source category.
///
/// A record that already carries a `type` keeps it as its event type; otherwise the
/// category's wire name is used. The payload is not validated: a missing or unreadable
/// timestamp becomes `0`.
pub fn normalize(raw: RawEvent, source: TransactionCategory) -> TransactionEvent {
    let event_type = match raw.get(TYPE_FIELD) {
        Some(Value::String(label)) if !label.is_empty() => label.clone(),
        Some(value) if !is_falsy(value) => value.to_string(),
        _ => source.wire_name().to_string(),
    };

    let timestamp = match raw.get(TIMESTAMP_FIELD).and_then(parse_timestamp) {
        Some(ts) => ts,
        None => {
            trace!(target: "history", category = %source, "Record has no readable timestamp");
            0
        }
    };

    TransactionEvent {
        category: source,
        event_type,
        timestamp,
        payload: raw,
    }
}

/// `null`, `false`, `0` and `""` count as no label.
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f == 0.0 || f.is_nan()),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Subgraphs return timestamps as decimal strings; other sources use numbers.
fn parse_timestamp(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
