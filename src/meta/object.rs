//! Document and field descriptors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::filter::Filter;

/// Labels keyed by language (`en`, `pt_BR`, ...)
pub type Labels = BTreeMap<String, String>;

/// Label for `lang`, falling back to `en`, then to any label
pub fn localized<'a>(labels: &'a Labels, lang: &str) -> Option<&'a str> {
    labels
        .get(lang)
        .or_else(|| labels.get("en"))
        .or_else(|| labels.values().next())
        .map(String::as_str)
}

/// A document type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaObject {
    #[serde(default, alias = "_id")]
    pub name: String,

    #[serde(default)]
    pub label: Labels,

    #[serde(default)]
    pub fields: BTreeMap<String, FieldMeta>,
}

impl MetaObject {
    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.get(name)
    }
}

/// A field of a document type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMeta {
    #[serde(default)]
    pub name: String,

    #[serde(rename = "type")]
    pub field_type: String,

    /// Referenced document for `lookup` fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,

    #[serde(default)]
    pub is_list: bool,

    #[serde(default)]
    pub label: Labels,

    /// Picklist options: key to labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, Labels>,

    /// Lookup fields copied into the embedded reference
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub description_fields: Vec<String>,

    /// Lookup fields merged in when detail fields are requested
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detail_fields: Vec<String>,
}

impl FieldMeta {
    pub fn is_lookup(&self) -> bool {
        self.field_type == "lookup"
    }

    pub fn label_for(&self, lang: &str) -> String {
        localized(&self.label, lang)
            .map(str::to_string)
            .unwrap_or_else(|| self.name.clone())
    }
}

/// List/view metadata; only its default filter matters here
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayMeta {
    #[serde(default)]
    pub filter: Option<Filter>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_localized_fallback() {
        let mut labels = Labels::new();
        labels.insert("en".into(), "Status".into());
        labels.insert("pt_BR".into(), "Situação".into());
        assert_eq!(localized(&labels, "pt_BR"), Some("Situação"));
        assert_eq!(localized(&labels, "es"), Some("Status"));
        assert_eq!(localized(&Labels::new(), "en"), None);
    }
}
