//! # Query Matcher
//!
//! Parses the native query dialect back into a [`Predicate`] so the
//! memory store filters with the same engine field masking uses.

use regex::RegexBuilder;
use serde_json::{Map, Value};

use super::errors::{StoreError, StoreResult};
use crate::filter::{FieldTest, Predicate};
use crate::record::is_native_date;

/// Parse a native query document
pub fn parse_query(query: &Value) -> StoreResult<Predicate> {
    match query {
        Value::Object(map) => parse_document(map),
        other => Err(StoreError::InvalidQuery(format!(
            "expected a query document, got {}",
            other
        ))),
    }
}

fn parse_document(map: &Map<String, Value>) -> StoreResult<Predicate> {
    let mut clauses = Vec::with_capacity(map.len());
    for (key, value) in map {
        let clause = match key.as_str() {
            "$and" => Predicate::And(parse_list(key, value)?),
            "$or" => Predicate::Or(parse_list(key, value)?),
            "$text" => {
                let search = value
                    .get("$search")
                    .and_then(Value::as_str)
                    .ok_or_else(|| StoreError::InvalidQuery("$text needs $search".into()))?;
                Predicate::Text(search.to_string())
            }
            op if op.starts_with('$') => return Err(StoreError::UnknownOperator(op.to_string())),
            field => Predicate::field(field, parse_field_expr(value)?),
        };
        clauses.push(clause);
    }
    Ok(match clauses.len() {
        0 => Predicate::True,
        1 => clauses.remove(0),
        _ => Predicate::And(clauses),
    })
}

fn parse_list(key: &str, value: &Value) -> StoreResult<Vec<Predicate>> {
    let items = value
        .as_array()
        .ok_or_else(|| StoreError::InvalidQuery(format!("{} needs an array", key)))?;
    items.iter().map(parse_query).collect()
}

/// True for `{ "$op": ... }` documents; native dates are plain values
fn is_operator_doc(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            !map.is_empty() && !is_native_date(value) && map.keys().all(|k| k.starts_with('$'))
        }
        _ => false,
    }
}

fn parse_field_expr(value: &Value) -> StoreResult<FieldTest> {
    if !is_operator_doc(value) {
        return Ok(FieldTest::Eq(value.clone()));
    }
    let Value::Object(ops) = value else {
        return Ok(FieldTest::Eq(value.clone()));
    };

    let mut tests = Vec::with_capacity(ops.len());
    for (op, arg) in ops {
        let test = match op.as_str() {
            "$eq" => FieldTest::Eq(arg.clone()),
            "$ne" => FieldTest::Ne(arg.clone()),
            "$gt" => FieldTest::Gt(arg.clone()),
            "$gte" => FieldTest::Gte(arg.clone()),
            "$lt" => FieldTest::Lt(arg.clone()),
            "$lte" => FieldTest::Lte(arg.clone()),
            "$in" => FieldTest::In(list_arg(op, arg)?),
            "$nin" => FieldTest::Nin(list_arg(op, arg)?),
            "$exists" => FieldTest::Exists(arg.as_bool().unwrap_or(true)),
            "$regex" => regex_test(arg, ops.get("$options"))?,
            "$options" => continue,
            "$not" => {
                if !is_operator_doc(arg) {
                    return Err(StoreError::InvalidQuery("$not needs an operator document".into()));
                }
                FieldTest::Not(Box::new(parse_field_expr(arg)?))
            }
            other => return Err(StoreError::UnknownOperator(other.to_string())),
        };
        tests.push(test);
    }

    Ok(match tests.len() {
        1 => tests.remove(0),
        _ => FieldTest::All(tests),
    })
}

fn list_arg(op: &str, arg: &Value) -> StoreResult<Vec<Value>> {
    arg.as_array()
        .cloned()
        .ok_or_else(|| StoreError::InvalidQuery(format!("{} needs an array", op)))
}

fn regex_test(pattern: &Value, options: Option<&Value>) -> StoreResult<FieldTest> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| StoreError::InvalidQuery("$regex needs a string".into()))?;
    let options = options.and_then(Value::as_str).unwrap_or("");
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .build()
        .map_err(|e| StoreError::InvalidQuery(e.to_string()))?;
    Ok(FieldTest::Regex(regex))
}
