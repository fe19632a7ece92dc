//! Lenient numeric parsing for catalog, cart and rate data
//!
//! Source documents carry numbers as JSON numbers, numeric strings, strings
//! with trailing units ("2.5 kW"), empty strings or nothing at all. Anything
//! that does not start with a finite number reads as 0.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

static FLOAT_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?").expect("float prefix pattern")
});

/// Map NaN and infinities to 0
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

/// Read the leading number of a string, ignoring leading whitespace and
/// anything after the number.
pub fn parse_float(text: &str) -> f64 {
    FLOAT_PREFIX
        .find(text.trim_start())
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map_or(0.0, finite_or_zero)
}

/// Read a JSON value as a number. Numbers and numeric strings are accepted.
pub fn value_to_f64(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().map_or(0.0, finite_or_zero),
        Value::String(s) => parse_float(s),
        _ => 0.0,
    }
}

/// Read a JSON value as a machine quantity. Fractions are truncated and
/// anything non-positive is 0.
pub fn value_to_quantity(value: &Value) -> u32 {
    let q = value_to_f64(value).trunc();
    if q <= 0.0 {
        0
    } else if q >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        q as u32
    }
}

/// Read a JSON value as display text. Numbers are rendered, blanks are `None`.
pub fn value_to_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Clamp a user-entered tariff: non-finite becomes 0, negatives become 0
pub fn clamp_rate(value: f64) -> f64 {
    finite_or_zero(value).max(0.0)
}

/// `deserialize_with` adapter for numeric fields that may be missing or malformed
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_f64(&value))
}

/// `deserialize_with` adapter for quantities
pub fn lenient_quantity<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_quantity(&value))
}
