//! Reading dimension and measure values out of records.

use chrono::{DateTime, Datelike, Utc};
use serde_json::Value;

use crate::aggregate::config::{DateBucket, LookupDisplay};
use crate::record::{as_native_date, parse_date, values_at_path, Record};

/// First value at a dotted path; arrays contribute their first match
pub fn pick<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    values_at_path(record, path)
        .into_iter()
        .find(|v| !v.is_null())
}

/// Numeric reading of a measure.
///
/// Numbers, numeric strings and money objects (`{value}`) count.
pub fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Object(map) => map.get("value").and_then(numeric_value),
        _ => None,
    }
}

/// An instant from a canonical date string or a native date
pub fn date_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_date(s),
        other => as_native_date(other),
    }
}

/// Plain text for a dimension value
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.first().map(display_value).unwrap_or_default(),
        Value::Object(map) => {
            if let Some(at) = as_native_date(value) {
                return crate::record::format_date(&at);
            }
            ["full", "name", "value", "address", "phoneNumber", "_id"]
                .iter()
                .find_map(|key| map.get(*key).filter(|v| !v.is_null()))
                .map(display_value)
                .unwrap_or_default()
        }
    }
}

/// Bucket label for a date: `2024-01-15`, `2024-W03`, `2024-01`, `2024-Q1`, `2024`
pub fn bucket_label(at: &DateTime<Utc>, bucket: DateBucket) -> String {
    match bucket {
        DateBucket::D => at.format("%Y-%m-%d").to_string(),
        DateBucket::W => {
            let week = at.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        }
        DateBucket::M => at.format("%Y-%m").to_string(),
        DateBucket::Q => format!("{}-Q{}", at.year(), (at.month() - 1) / 3 + 1),
        DateBucket::Y => at.year().to_string(),
    }
}

/// Key and label of a lookup dimension.
///
/// The key is the display field; the label fills the format pattern.
pub fn lookup_key_label(value: &Value, lookup: &LookupDisplay) -> (String, String) {
    let Some(map) = value.as_object() else {
        let text = display_value(value);
        return (text.clone(), text);
    };
    let field_text = |field: &str| map.get(field).map(display_value).unwrap_or_default();

    let key = field_text(&lookup.display_field);
    let label = if lookup.format_pattern.is_empty() {
        key.clone()
    } else {
        lookup
            .simple_fields
            .iter()
            .fold(lookup.format_pattern.clone(), |label, field| {
                label.replace(&format!("{{{}}}", field), &field_text(field))
            })
    };
    (key, label)
}
