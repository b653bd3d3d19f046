//! # Filter AST
//!
//! The declarative condition tree accepted from callers and stored in
//! access profiles and display metadata.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// How a node's clauses combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    #[default]
    And,
    Or,
}

/// A filter node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(rename = "match", default)]
    pub match_mode: MatchMode,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,

    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    pub conditions: Conditions,

    /// Full text search handed to the store as `$text`
    #[serde(
        rename = "textSearch",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub text_search: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
}

impl Filter {
    /// An AND node over the given children
    pub fn all_of(filters: Vec<Filter>) -> Self {
        Self {
            match_mode: MatchMode::And,
            filters,
            ..Default::default()
        }
    }

    /// A node holding only the given conditions
    pub fn with_conditions(match_mode: MatchMode, conditions: Vec<Condition>) -> Self {
        Self {
            match_mode,
            conditions: Conditions::List(conditions),
            ..Default::default()
        }
    }
}

/// Conditions may arrive as a list or keyed by an arbitrary name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Conditions {
    List(Vec<Condition>),
    Keyed(BTreeMap<String, Condition>),
}

impl Default for Conditions {
    fn default() -> Self {
        Conditions::List(Vec::new())
    }
}

impl Conditions {
    pub fn is_empty(&self) -> bool {
        match self {
            Conditions::List(list) => list.is_empty(),
            Conditions::Keyed(map) => map.is_empty(),
        }
    }

    /// Conditions that are not disabled, in declaration order
    pub fn active(&self) -> Vec<&Condition> {
        match self {
            Conditions::List(list) => list.iter().filter(|c| !c.disabled).collect(),
            Conditions::Keyed(map) => map.values().filter(|c| !c.disabled).collect(),
        }
    }
}

/// A single `term operator value` test
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub term: String,

    #[serde(default)]
    pub operator: String,

    /// `None` when the key is absent; `Some(Value::Null)` for an explicit null
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<Value>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,

    /// Negates the compiled clause
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub invert: bool,
}

impl Condition {
    pub fn new(term: impl Into<String>, operator: impl Into<String>, value: Value) -> Self {
        Self {
            term: term.into(),
            operator: operator.into(),
            value: Some(value),
            ..Default::default()
        }
    }

    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }
}

fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}
