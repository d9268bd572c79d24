//! # Row mappers
//!
//! The only place that knows the shape of stored rows. Each entity has one
//! canonical type in `shared` and two boundaries here:
//!
//! - local record (camelCase JSON) ↔ domain
//! - remote row (snake_case columns) ↔ domain
//!
//! Readers are lenient: they accept the legacy field names older clients wrote,
//! numbers encoded as strings, and missing optional fields. A row that lacks a
//! required field maps to `None` and is skipped by the caller.

pub mod kid_mapper;
pub mod reward_mapper;
pub mod transaction_mapper;
pub mod user_mapper;

pub use kid_mapper::KidMapper;
pub use reward_mapper::{RedemptionMapper, RewardMapper};
pub use transaction_mapper::TransactionMapper;
pub use user_mapper::UserMapper;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

/// First present, non-null value among `keys`.
pub(crate) fn pick<'a>(row: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| row.get(*key))
        .find(|value| !value.is_null())
}

pub(crate) fn pick_str(row: &Value, keys: &[&str]) -> Option<String> {
    match pick(row, keys)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Non-empty string value.
pub(crate) fn pick_id(row: &Value, keys: &[&str]) -> Option<String> {
    pick_str(row, keys).filter(|s| !s.trim().is_empty())
}

/// Numbers, or strings holding a number (Postgres `numeric` arrives as text).
pub(crate) fn pick_f64(row: &Value, keys: &[&str]) -> Option<f64> {
    match pick(row, keys)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

pub(crate) fn pick_bool(row: &Value, keys: &[&str]) -> Option<bool> {
    match pick(row, keys)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// RFC 3339 strings, Postgres `timestamptz` text, or epoch milliseconds.
pub(crate) fn pick_time(row: &Value, keys: &[&str]) -> Option<DateTime<Utc>> {
    match pick(row, keys)? {
        Value::String(s) => parse_time(s),
        Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

pub(crate) fn pick_date(row: &Value, keys: &[&str]) -> Option<NaiveDate> {
    let raw = pick_str(row, keys)?;
    let day = raw.get(..10).unwrap_or(&raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z")
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

pub(crate) fn time_to_value(time: Option<DateTime<Utc>>) -> Value {
    time.map(|t| Value::String(t.to_rfc3339()))
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pick_prefers_first_present_key() {
        let row = json!({"saldo": null, "balance": "12.50"});
        assert_eq!(pick_f64(&row, &["saldo", "balance"]), Some(12.5));
        assert_eq!(pick_f64(&row, &["missing"]), None);
    }

    #[test]
    fn test_time_formats() {
        let row = json!({
            "a": "2024-03-01T10:00:00Z",
            "b": "2024-03-01 10:00:00.123+00",
            "c": 1709287200000i64,
        });
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(pick_time(&row, &["a"]), Some(expected));
        assert_eq!(
            pick_time(&row, &["b"]).map(|t| t.timestamp()),
            Some(expected.timestamp())
        );
        assert_eq!(pick_time(&row, &["c"]), Some(expected));
    }

    #[test]
    fn test_pick_date_accepts_timestamps() {
        let row = json!({"birthdate": "2015-06-15T00:00:00Z"});
        assert_eq!(
            pick_date(&row, &["birthdate"]),
            NaiveDate::from_ymd_opt(2015, 6, 15)
        );
    }
}
