//! Record sorting for the memory store
//!
//! Multi-key, stable and deterministic.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::{as_native_date, first_at_path, Record};

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One sort key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Sorts records
pub struct RecordSorter;

impl RecordSorter {
    /// Sorts by each key in turn; ties keep their input order
    pub fn sort(records: &mut [&Record], keys: &[SortKey]) {
        records.sort_by(|a, b| Self::compare_records(a, b, keys));
    }

    pub fn compare_records(a: &Record, b: &Record, keys: &[SortKey]) -> Ordering {
        for key in keys {
            let ordering =
                Self::compare_values(first_at_path(a, &key.field), first_at_path(b, &key.field));
            let ordering = match key.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Compares two values for sorting.
    ///
    /// Ordering rules:
    /// - missing = null < bool < number < string < date
    /// - same kind uses natural ordering, dates by instant
    pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
        let rank = |v: Option<&Value>| -> u8 {
            match v {
                None | Some(Value::Null) => 0,
                Some(Value::Bool(_)) => 1,
                Some(Value::Number(_)) => 2,
                Some(Value::String(_)) => 3,
                Some(v) if as_native_date(v).is_some() => 4,
                Some(Value::Array(_)) => 5,
                Some(Value::Object(_)) => 6,
            }
        };

        let (a_rank, b_rank) = (rank(a), rank(b));
        if a_rank != b_rank {
            return a_rank.cmp(&b_rank);
        }

        match (a, b) {
            (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
            (Some(Value::Number(x)), Some(Value::Number(y))) => {
                let x = x.as_f64().unwrap_or(0.0);
                let y = y.as_f64().unwrap_or(0.0);
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
            (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
            (Some(x), Some(y)) => match (as_native_date(x), as_native_date(y)) {
                (Some(x), Some(y)) => x.cmp(&y),
                // Arrays and objects not compared
                _ => Ordering::Equal,
            },
            _ => Ordering::Equal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn ids(records: &[&Record]) -> Vec<String> {
        records
            .iter()
            .map(|r| r["_id"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_sort_multi_key() {
        let docs = vec![
            rec(json!({"_id": "c", "g": 1, "n": 3})),
            rec(json!({"_id": "a", "g": 2, "n": 1})),
            rec(json!({"_id": "b", "g": 1, "n": 5})),
        ];
        let mut refs: Vec<&Record> = docs.iter().collect();
        RecordSorter::sort(&mut refs, &[SortKey::asc("g"), SortKey::desc("n")]);
        assert_eq!(ids(&refs), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_sort_nested_and_missing() {
        let docs = vec![
            rec(json!({"_id": "x", "amount": {"value": 10}})),
            rec(json!({"_id": "y"})),
            rec(json!({"_id": "z", "amount": {"value": 2}})),
        ];
        let mut refs: Vec<&Record> = docs.iter().collect();
        RecordSorter::sort(&mut refs, &[SortKey::asc("amount.value")]);
        assert_eq!(ids(&refs), vec!["y", "z", "x"]);
    }

    #[test]
    fn test_dates_by_instant() {
        let a = json!({"$date": "2024-01-01T10:00:00+02:00"});
        let b = json!({"$date": "2024-01-01T09:00:00Z"});
        assert_eq!(RecordSorter::compare_values(Some(&a), Some(&b)), Ordering::Less);
        assert_eq!(
            RecordSorter::compare_values(Some(&json!("z")), Some(&b)),
            Ordering::Less
        );
    }
}
