//! # Caller
//!
//! The resolved caller: identity, groups, per-document access grants and
//! the raw user record that `$user.<path>` tokens read from.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::errors::{AuthError, AuthResult};
use crate::record::{first_at_path, Record};

/// Access grant for one document in a user's access map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccessGrant {
    /// `false` denies; `true` falls back to the defaults
    Flag(bool),
    Named(String),
    Many(Vec<String>),
}

impl AccessGrant {
    pub fn names(&self) -> Vec<&str> {
        match self {
            AccessGrant::Flag(_) => Vec::new(),
            AccessGrant::Named(name) => vec![name.as_str()],
            AccessGrant::Many(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

/// Authenticated caller
#[derive(Debug, Clone, Default)]
pub struct User {
    pub id: String,
    pub group: Option<String>,
    pub groups: Vec<String>,
    pub access: HashMap<String, AccessGrant>,
    pub locale: Option<String>,
    record: Record,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let mut record = Record::new();
        record.insert("_id".to_string(), Value::String(id.clone()));
        Self {
            id,
            record,
            ..Default::default()
        }
    }

    /// Interpret a `User` document
    pub fn from_record(record: Record) -> AuthResult<Self> {
        let id = record
            .get("_id")
            .and_then(Value::as_str)
            .ok_or_else(|| AuthError::InvalidUser("missing _id".to_string()))?
            .to_string();

        let group = first_at_path(&record, "group._id")
            .and_then(Value::as_str)
            .map(str::to_string);

        let groups = record
            .get("groups")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|g| g.get("_id").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let access = match record.get("access") {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| AuthError::InvalidUser(format!("invalid access map: {}", e)))?,
            None => HashMap::new(),
        };

        let locale = record
            .get("locale")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Self {
            id,
            group,
            groups,
            access,
            locale,
            record,
        })
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        let group = group.into();
        self.record
            .insert("group".to_string(), json!({ "_id": group.clone() }));
        self.group = Some(group);
        self
    }

    pub fn with_groups(mut self, groups: Vec<String>) -> Self {
        let ids: Vec<Value> = groups.iter().map(|g| json!({ "_id": g })).collect();
        self.record.insert("groups".to_string(), Value::Array(ids));
        self.groups = groups;
        self
    }

    pub fn with_access(mut self, document: impl Into<String>, grant: AccessGrant) -> Self {
        self.access.insert(document.into(), grant);
        self
    }

    /// Sets an arbitrary attribute on the user record
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.record.insert(key.into(), value);
        self
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    /// Path lookup into the user record
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        first_at_path(&self.record, path)
    }

    /// Main group followed by secondary groups
    pub fn all_group_ids(&self) -> Vec<String> {
        self.group
            .iter()
            .chain(self.groups.iter())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_record() {
        let record = json!({
            "_id": "u1",
            "group": {"_id": "g1", "name": "Sales"},
            "groups": [{"_id": "g2"}, {"_id": "g3"}],
            "access": {"Contact": "Manager", "Secret": false, "Deal": ["A", "B"]},
            "branch": {"_id": "b9"}
        });
        let user = User::from_record(record.as_object().cloned().unwrap()).unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.group.as_deref(), Some("g1"));
        assert_eq!(user.all_group_ids(), vec!["g1", "g2", "g3"]);
        assert_eq!(user.access["Secret"], AccessGrant::Flag(false));
        assert_eq!(user.access["Deal"].names(), vec!["A", "B"]);
        assert_eq!(user.lookup("branch._id"), Some(&json!("b9")));
    }

    #[test]
    fn test_missing_id() {
        let record = json!({"name": "x"}).as_object().cloned().unwrap();
        assert!(matches!(
            User::from_record(record),
            Err(AuthError::InvalidUser(_))
        ));
    }

    #[test]
    fn test_builders_keep_record_in_sync() {
        let user = User::new("u1").with_group("g1");
        assert_eq!(user.lookup("group._id"), Some(&json!("g1")));
    }
}
