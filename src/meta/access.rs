//! Access profiles.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::filter::{Condition, Filter};

/// A named access profile for one document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaAccess {
    #[serde(default)]
    pub is_readable: bool,
    #[serde(default)]
    pub is_updatable: bool,
    #[serde(default)]
    pub is_creatable: bool,
    #[serde(default)]
    pub is_deletable: bool,

    #[serde(default)]
    pub field_defaults: FieldDefaults,

    #[serde(default)]
    pub fields: BTreeMap<String, FieldAccessRules>,

    /// Row-level filter ANDed into every read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_filter: Option<Filter>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefaults {
    #[serde(default)]
    pub is_readable: bool,
    #[serde(default)]
    pub is_updatable: bool,
    #[serde(default)]
    pub is_creatable: bool,
    #[serde(default)]
    pub is_deletable: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldAccessRules {
    #[serde(rename = "READ", default, skip_serializing_if = "Option::is_none")]
    pub read: Option<AccessRule>,
    #[serde(rename = "UPDATE", default, skip_serializing_if = "Option::is_none")]
    pub update: Option<AccessRule>,
    #[serde(rename = "CREATE", default, skip_serializing_if = "Option::is_none")]
    pub create: Option<AccessRule>,
    #[serde(rename = "DELETE", default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<AccessRule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}
