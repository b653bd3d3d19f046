//! # Records
//!
//! Plain keyed value maps flowing through the query pipeline, and the
//! helpers every stage shares: dotted path access and native date handling.
//!
//! Native dates use the extended JSON shape `{"$date": "<RFC 3339>"}`.
//! The canonical string form is RFC 3339 UTC with millisecond precision.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{Map, Value};

/// A single document as read from the store
pub type Record = Map<String, Value>;

/// Key marking a native date value
pub const DATE_KEY: &str = "$date";

/// Build a native date value
pub fn native_date(at: DateTime<Utc>) -> Value {
    let mut map = Map::new();
    map.insert(DATE_KEY.to_string(), Value::String(format_date(&at)));
    Value::Object(map)
}

/// Canonical string form of a date
pub fn format_date(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 string into a UTC instant
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Returns the instant held by a native date value.
///
/// Accepts `{"$date": "<RFC 3339>"}` and `{"$date": <epoch millis>}`.
pub fn as_native_date(value: &Value) -> Option<DateTime<Utc>> {
    let map = value.as_object()?;
    if map.len() != 1 {
        return None;
    }
    match map.get(DATE_KEY)? {
        Value::String(text) => parse_date(text),
        Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

pub fn is_native_date(value: &Value) -> bool {
    as_native_date(value).is_some()
}

/// Rewrites every native date under `value` into its canonical string.
///
/// Arrays and nested objects are walked; other values are left untouched.
pub fn normalize_dates(value: &mut Value) {
    if let Some(at) = as_native_date(value) {
        *value = Value::String(format_date(&at));
        return;
    }
    match value {
        Value::Array(items) => items.iter_mut().for_each(normalize_dates),
        Value::Object(map) => map.values_mut().for_each(normalize_dates),
        _ => {}
    }
}

/// Record-level form of [`normalize_dates`]
pub fn normalize_record_dates(record: &mut Record) {
    record.values_mut().for_each(normalize_dates);
}

/// Collects every value reachable at a dotted path.
///
/// Arrays met along the way are descended element-wise, and a numeric
/// segment also addresses an array position, matching the store's
/// path semantics.
pub fn values_at_path<'a>(record: &'a Record, path: &str) -> Vec<&'a Value> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    if let Some((head, rest)) = segments.split_first() {
        if let Some(value) = record.get(*head) {
            collect(value, rest, &mut out);
        }
    }
    out
}

fn collect<'a>(value: &'a Value, segments: &[&str], out: &mut Vec<&'a Value>) {
    let Some((head, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };
    match value {
        Value::Object(map) => {
            if let Some(child) = map.get(*head) {
                collect(child, rest, out);
            }
        }
        Value::Array(items) => {
            if let Ok(index) = head.parse::<usize>() {
                if let Some(item) = items.get(index) {
                    collect(item, rest, out);
                }
            }
            for item in items.iter().filter(|item| item.is_object()) {
                collect(item, segments, out);
            }
        }
        _ => {}
    }
}

/// First value at a dotted path, descending through objects only
pub fn first_at_path<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = record.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Top-level field name of a dotted path
pub fn root_segment(path: &str) -> &str {
    path.split('.').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_native_date_round_trip() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let value = native_date(at);
        assert_eq!(value, json!({"$date": "2024-03-01T12:30:00.000Z"}));
        assert_eq!(as_native_date(&value), Some(at));
    }

    #[test]
    fn test_epoch_millis_date() {
        let value = json!({"$date": 0});
        assert_eq!(
            as_native_date(&value).map(|d| format_date(&d)),
            Some("1970-01-01T00:00:00.000Z".to_string())
        );
    }

    #[test]
    fn test_not_a_date() {
        assert!(!is_native_date(&json!({"$date": "yesterday"})));
        assert!(!is_native_date(&json!({"$date": "2024-01-01T00:00:00Z", "x": 1})));
        assert!(!is_native_date(&json!("2024-01-01T00:00:00Z")));
    }

    #[test]
    fn test_normalize_nested_dates() {
        let mut value = json!({
            "a": {"$date": "2024-01-02T03:04:05+02:00"},
            "list": [{"when": {"$date": "2024-01-02T00:00:00Z"}}, 3, "x"],
            "n": 1
        });
        normalize_dates(&mut value);
        assert_eq!(
            value,
            json!({
                "a": "2024-01-02T01:04:05.000Z",
                "list": [{"when": "2024-01-02T00:00:00.000Z"}, 3, "x"],
                "n": 1
            })
        );
    }

    #[test]
    fn test_values_at_path_through_arrays() {
        let r = record(json!({
            "_user": [{"_id": "u1"}, {"_id": "u2"}],
            "address": {"city": "Porto"},
            "tags": ["a", "b"]
        }));
        let ids: Vec<_> = values_at_path(&r, "_user._id");
        assert_eq!(ids, vec![&json!("u1"), &json!("u2")]);
        assert_eq!(values_at_path(&r, "address.city"), vec![&json!("Porto")]);
        assert_eq!(values_at_path(&r, "tags"), vec![&json!(["a", "b"])]);
        assert_eq!(values_at_path(&r, "_user.0._id"), vec![&json!("u1")]);
        assert!(values_at_path(&r, "missing.path").is_empty());
    }

    #[test]
    fn test_first_at_path() {
        let r = record(json!({"amount": {"value": 10}}));
        assert_eq!(first_at_path(&r, "amount.value"), Some(&json!(10)));
        assert_eq!(first_at_path(&r, "amount.currency"), None);
        assert_eq!(root_segment("amount.value"), "amount");
    }
}
