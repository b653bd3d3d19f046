//! Field projections applied by the store.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::record::Record;

/// Which fields a find returns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Projection {
    /// Every field
    #[default]
    All,
    /// Only these paths; `_id` is always kept
    Include(BTreeSet<String>),
    /// Every field but these paths
    Exclude(BTreeSet<String>),
}

impl Projection {
    pub fn include<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Projection::Include(paths.into_iter().map(Into::into).collect())
    }

    pub fn exclude<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Projection::Exclude(paths.into_iter().map(Into::into).collect())
    }

    /// Projected paths, empty for [`Projection::All`]
    pub fn paths(&self) -> Option<&BTreeSet<String>> {
        match self {
            Projection::All => None,
            Projection::Include(paths) | Projection::Exclude(paths) => Some(paths),
        }
    }

    pub fn apply(&self, record: &Record) -> Record {
        match self {
            Projection::All => record.clone(),
            Projection::Include(paths) => {
                let mut out = Record::new();
                if let Some(id) = record.get("_id") {
                    out.insert("_id".to_string(), id.clone());
                }
                for path in paths {
                    let segments: Vec<&str> = path.split('.').collect();
                    let Some((head, rest)) = segments.split_first() else {
                        continue;
                    };
                    if let Some(projected) = record.get(*head).and_then(|v| pick(v, rest)) {
                        merge(&mut out, head, projected);
                    }
                }
                out
            }
            Projection::Exclude(paths) => {
                let mut out = record.clone();
                for path in paths {
                    let segments: Vec<&str> = path.split('.').collect();
                    remove(&mut out, &segments);
                }
                out
            }
        }
    }
}

fn pick(value: &Value, segments: &[&str]) -> Option<Value> {
    let Some((head, rest)) = segments.split_first() else {
        return Some(value.clone());
    };
    match value {
        Value::Object(map) => {
            let child = pick(map.get(*head)?, rest)?;
            let mut out = Map::new();
            out.insert(head.to_string(), child);
            Some(Value::Object(out))
        }
        Value::Array(items) => Some(Value::Array(
            items
                .iter()
                .filter(|item| item.is_object())
                .filter_map(|item| pick(item, segments))
                .collect(),
        )),
        _ => None,
    }
}

fn merge(out: &mut Map<String, Value>, key: &str, value: Value) {
    match out.get_mut(key) {
        Some(existing) => merge_value(existing, value),
        None => {
            out.insert(key.to_string(), value);
        }
    }
}

fn merge_value(existing: &mut Value, incoming: Value) {
    match (existing, incoming) {
        (Value::Object(existing), Value::Object(incoming)) => {
            for (k, v) in incoming {
                merge(existing, &k, v);
            }
        }
        (Value::Array(existing), Value::Array(incoming)) if existing.len() == incoming.len() => {
            for (slot, item) in existing.iter_mut().zip(incoming) {
                merge_value(slot, item);
            }
        }
        (existing, incoming) => *existing = incoming,
    }
}

fn remove(map: &mut Map<String, Value>, segments: &[&str]) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        map.remove(*head);
        return;
    }
    match map.get_mut(*head) {
        Some(Value::Object(child)) => remove(child, rest),
        Some(Value::Array(items)) => {
            for item in items.iter_mut() {
                if let Value::Object(child) = item {
                    remove(child, rest);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_include_keeps_id_and_nested_paths() {
        let doc = rec(json!({
            "_id": "1", "name": "n", "secret": "s",
            "contact": {"_id": "c", "name": "x", "phone": "p"},
            "items": [{"a": 1, "b": 2}, {"a": 3, "b": 4}]
        }));
        let projected =
            Projection::include(["name", "contact._id", "contact.name", "items.a"]).apply(&doc);
        assert_eq!(
            Value::Object(projected),
            json!({
                "_id": "1", "name": "n",
                "contact": {"_id": "c", "name": "x"},
                "items": [{"a": 1}, {"a": 3}]
            })
        );
    }

    #[test]
    fn test_exclude_nested() {
        let doc = rec(json!({"_id": "1", "a": {"b": 1, "c": 2}, "d": 3}));
        let projected = Projection::exclude(["a.b", "d"]).apply(&doc);
        assert_eq!(Value::Object(projected), json!({"_id": "1", "a": {"c": 2}}));
    }
}
