//! # Predicates
//!
//! In-memory evaluation tree with the store's matching semantics:
//! - dotted paths traverse arrays; a test matches if any reached value does
//! - a leaf array is tested both as a whole and element-wise
//! - equality with `null` also matches a missing path
//! - `$ne`/`$nin` are the negations of equality and membership
//! - ordering compares numbers, strings and dates only within their kind

use std::cmp::Ordering;

use regex::Regex;
use serde_json::Value;

use crate::record::{as_native_date, values_at_path, Record};

/// A test applied to the values found at one path
#[derive(Debug, Clone)]
pub enum FieldTest {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    Regex(Regex),
    Not(Box<FieldTest>),
    All(Vec<FieldTest>),
}

/// A record-level boolean tree
#[derive(Debug, Clone)]
pub enum Predicate {
    True,
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Field { path: String, test: FieldTest },
    /// Full text search over every string in the record
    Text(String),
}

impl Predicate {
    pub fn field(path: impl Into<String>, test: FieldTest) -> Self {
        Predicate::Field {
            path: path.into(),
            test,
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Predicate::True => true,
            Predicate::And(items) => items.iter().all(|p| p.matches(record)),
            Predicate::Or(items) => items.iter().any(|p| p.matches(record)),
            Predicate::Field { path, test } => test.eval(&values_at_path(record, path)),
            Predicate::Text(search) => text_matches(record, search),
        }
    }
}

impl FieldTest {
    /// Evaluates against the values reached by a path
    pub fn eval(&self, found: &[&Value]) -> bool {
        match self {
            FieldTest::Eq(expected) => eq_any(found, expected),
            FieldTest::Ne(expected) => !eq_any(found, expected),
            FieldTest::Gt(bound) => cmp_any(found, bound, |o| o == Ordering::Greater),
            FieldTest::Gte(bound) => cmp_any(found, bound, |o| o != Ordering::Less),
            FieldTest::Lt(bound) => cmp_any(found, bound, |o| o == Ordering::Less),
            FieldTest::Lte(bound) => cmp_any(found, bound, |o| o != Ordering::Greater),
            FieldTest::In(list) => list.iter().any(|item| eq_any(found, item)),
            FieldTest::Nin(list) => !list.iter().any(|item| eq_any(found, item)),
            FieldTest::Exists(expected) => !found.is_empty() == *expected,
            FieldTest::Regex(regex) => candidates(found)
                .into_iter()
                .any(|v| v.as_str().map(|s| regex.is_match(s)).unwrap_or(false)),
            FieldTest::Not(inner) => !inner.eval(found),
            FieldTest::All(tests) => tests.iter().all(|t| t.eval(found)),
        }
    }
}

/// Leaf values plus the elements of leaf arrays
fn candidates<'a>(found: &[&'a Value]) -> Vec<&'a Value> {
    let mut out = Vec::with_capacity(found.len());
    for value in found {
        out.push(*value);
        if let Value::Array(items) = value {
            out.extend(items.iter());
        }
    }
    out
}

fn eq_any(found: &[&Value], expected: &Value) -> bool {
    if expected.is_null() && found.is_empty() {
        return true;
    }
    candidates(found).into_iter().any(|v| values_equal(v, expected))
}

fn cmp_any(found: &[&Value], bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    candidates(found)
        .into_iter()
        .filter_map(|v| compare_same_kind(v, bound))
        .any(accept)
}

/// Equality with numeric and date normalization
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => match (as_native_date(a), as_native_date(b)) {
            (Some(x), Some(y)) => x == y,
            (None, None) => a == b,
            _ => false,
        },
    }
}

/// Orders values of the same kind; `None` across kinds
pub fn compare_same_kind(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => Some(as_native_date(a)?.cmp(&as_native_date(b)?)),
    }
}

fn text_matches(record: &Record, search: &str) -> bool {
    let words: Vec<String> = search
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();
    if words.is_empty() {
        return false;
    }
    let mut texts = Vec::new();
    for value in record.values() {
        collect_strings(value, &mut texts);
    }
    texts.iter().any(|text| {
        let lower = text.to_lowercase();
        words.iter().any(|w| lower.contains(w.as_str()))
    })
}

fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}
