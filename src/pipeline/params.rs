//! Find request parameters.

use std::collections::BTreeSet;

use serde_json::Value;

use super::transforms::DetailLookup;
use crate::filter::{CompileError, CompileResult, Filter};
use crate::meta::MetaObject;
use crate::store::{SortDirection, SortKey};

/// One streaming read
#[derive(Debug, Clone)]
pub struct FindRequest {
    pub document: String,
    pub token: Option<String>,
    pub filter: Option<Filter>,
    /// `[{property|term, direction}]` or `{field: 1|-1|"asc"|"desc"}`
    pub sort: Option<Value>,
    /// Comma-separated field list
    pub fields: Option<String>,
    pub limit: Option<i64>,
    pub start: Option<i64>,
    pub with_detail_fields: bool,
    pub transform_dates_to_string: bool,
    pub display_name: Option<String>,
    pub display_type: Option<String>,
    pub get_total: bool,
    /// Lookups to populate regardless of `with_detail_fields`
    pub lookups: Vec<DetailLookup>,
}

impl FindRequest {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            token: None,
            filter: None,
            sort: None,
            fields: None,
            limit: None,
            start: None,
            with_detail_fields: false,
            transform_dates_to_string: true,
            display_name: None,
            display_type: None,
            get_total: false,
            lookups: Vec::new(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_fields(mut self, fields: impl Into<String>) -> Self {
        self.fields = Some(fields.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Splits a comma-separated field list
pub fn parse_field_list(fields: Option<&str>) -> BTreeSet<String> {
    fields
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Applies the default when the limit is absent, zero or negative
pub fn effective_limit(limit: Option<i64>, default_limit: usize) -> usize {
    match limit {
        Some(n) if n > 0 => usize::try_from(n).unwrap_or(usize::MAX),
        _ => default_limit,
    }
}

pub fn effective_skip(start: Option<i64>) -> usize {
    start
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(0)
}

/// Parses a sort spec; money sorts by `.value` and personName by `.full`
pub fn parse_sort(sort: &Value, meta: &MetaObject) -> CompileResult<Vec<SortKey>> {
    let raw = match sort {
        Value::Null => Vec::new(),
        Value::String(text) => {
            let parsed: Value = serde_json::from_str(text)
                .map_err(|e| CompileError::InvalidSort(e.to_string()))?;
            return parse_sort(&parsed, meta);
        }
        Value::Array(items) => items
            .iter()
            .map(|item| {
                let field = item
                    .get("property")
                    .or_else(|| item.get("term"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| CompileError::InvalidSort("entry needs property or term".into()))?;
                let direction = match item.get("direction") {
                    None | Some(Value::Null) => SortDirection::Asc,
                    Some(d) => direction(d)?,
                };
                Ok((field.to_string(), direction))
            })
            .collect::<CompileResult<Vec<_>>>()?,
        Value::Object(map) => map
            .iter()
            .map(|(field, d)| Ok((field.clone(), direction(d)?)))
            .collect::<CompileResult<Vec<_>>>()?,
        other => return Err(CompileError::InvalidSort(format!("unexpected {}", other))),
    };

    Ok(raw
        .into_iter()
        .filter(|(field, _)| field != "$textScore")
        .map(|(field, direction)| {
            let field = match meta.field(&field).map(|f| f.field_type.as_str()) {
                Some("money") => format!("{}.value", field),
                Some("personName") => format!("{}.full", field),
                _ => field,
            };
            SortKey { field, direction }
        })
        .collect())
}

fn direction(value: &Value) -> CompileResult<SortDirection> {
    match value {
        Value::Number(n) if n.as_f64() == Some(1.0) => Ok(SortDirection::Asc),
        Value::Number(n) if n.as_f64() == Some(-1.0) => Ok(SortDirection::Desc),
        Value::String(s) if s.eq_ignore_ascii_case("asc") => Ok(SortDirection::Asc),
        Value::String(s) if s.eq_ignore_ascii_case("desc") => Ok(SortDirection::Desc),
        other => Err(CompileError::InvalidSort(format!(
            "unknown direction {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta() -> MetaObject {
        serde_json::from_value(json!({
            "name": "Deal",
            "fields": {"amount": {"type": "money"}, "contact": {"type": "personName"}, "n": {"type": "number"}}
        }))
        .unwrap()
    }

    #[test]
    fn test_sort_shapes() {
        let meta = meta();
        assert_eq!(
            parse_sort(&json!([{"property": "amount", "direction": "DESC"}, {"term": "n"}]), &meta)
                .unwrap(),
            vec![SortKey::desc("amount.value"), SortKey::asc("n")]
        );
        assert_eq!(
            parse_sort(&json!({"contact": -1}), &meta).unwrap(),
            vec![SortKey::desc("contact.full")]
        );
        assert_eq!(
            parse_sort(&json!("[{\"property\": \"n\", \"direction\": \"asc\"}]"), &meta).unwrap(),
            vec![SortKey::asc("n")]
        );
        assert!(parse_sort(&json!({"n": "sideways"}), &meta).is_err());
    }

    #[test]
    fn test_limits_and_fields() {
        assert_eq!(effective_limit(None, 50), 50);
        assert_eq!(effective_limit(Some(0), 50), 50);
        assert_eq!(effective_limit(Some(-3), 50), 50);
        assert_eq!(effective_limit(Some(7), 50), 7);
        assert_eq!(effective_skip(Some(-1)), 0);
        assert_eq!(
            parse_field_list(Some("name, status,,_user")),
            ["_user", "name", "status"].iter().map(|s| s.to_string()).collect()
        );
        assert!(parse_field_list(None).is_empty());
    }
}
