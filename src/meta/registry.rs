//! The registry snapshot.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use super::access::MetaAccess;
use super::errors::{MetaError, MetaResult};
use super::object::{DisplayMeta, MetaObject};

/// On-disk layout of a metadata file
#[derive(Debug, Default, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    metas: HashMap<String, MetaObject>,
    /// Keyed `<document>:access:<name>`
    #[serde(default)]
    access: HashMap<String, MetaAccess>,
    /// Keyed `<document>:<displayType>:<displayName>`
    #[serde(default)]
    displays: HashMap<String, DisplayMeta>,
}

/// Immutable metadata snapshot
#[derive(Debug, Clone, Default)]
pub struct MetaRegistry {
    metas: HashMap<String, MetaObject>,
    access: HashMap<String, MetaAccess>,
    displays: HashMap<String, DisplayMeta>,
}

impl MetaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a registry from a JSON file
    pub fn load(path: &Path) -> MetaResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> MetaResult<Self> {
        let file: RegistryFile = serde_json::from_str(content)?;
        let mut registry = Self {
            metas: HashMap::new(),
            access: file.access,
            displays: file.displays,
        };
        for (name, meta) in file.metas {
            registry.insert_meta(name, meta);
        }
        Ok(registry)
    }

    /// Adds a document, filling names from map keys
    pub fn insert_meta(&mut self, name: impl Into<String>, mut meta: MetaObject) {
        let name = name.into();
        meta.name = name.clone();
        for (field_name, field) in meta.fields.iter_mut() {
            if field.name.is_empty() {
                field.name = field_name.clone();
            }
        }
        self.metas.insert(name, meta);
    }

    pub fn insert_access(&mut self, key: impl Into<String>, access: MetaAccess) {
        self.access.insert(key.into(), access);
    }

    pub fn insert_display(&mut self, key: impl Into<String>, display: DisplayMeta) {
        self.displays.insert(key.into(), display);
    }

    pub fn meta(&self, document: &str) -> Option<&MetaObject> {
        self.metas.get(document)
    }

    /// Access profile by full key (`<document>:access:<name>`)
    pub fn access(&self, key: &str) -> Option<&MetaAccess> {
        self.access.get(key)
    }

    pub fn display(
        &self,
        document: &str,
        display_type: &str,
        display_name: &str,
    ) -> Option<&DisplayMeta> {
        self.displays
            .get(&format!("{}:{}:{}", document, display_type, display_name))
    }

    pub fn document_count(&self) -> usize {
        self.metas.len()
    }

    /// Every lookup must reference a known document
    pub fn validate(&self) -> MetaResult<()> {
        for meta in self.metas.values() {
            for field in meta.fields.values().filter(|f| f.is_lookup()) {
                let target = field.document.clone().unwrap_or_default();
                if !self.metas.contains_key(&target) {
                    return Err(MetaError::DanglingReference {
                        document: meta.name.clone(),
                        field: field.name.clone(),
                        target,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "metas": {
            "Contact": {
                "fields": {
                    "name": {"type": "text"},
                    "owner": {"type": "lookup", "document": "User"}
                }
            },
            "User": {"fields": {"name": {"type": "text"}}}
        },
        "access": {
            "Contact:access:Default": {"isReadable": true, "fieldDefaults": {"isReadable": true}}
        },
        "displays": {
            "Contact:list:Default": {"filter": {"match": "and", "conditions": []}}
        }
    }"#;

    #[test]
    fn test_load_fills_names() {
        let registry = MetaRegistry::from_json_str(SAMPLE).unwrap();
        let contact = registry.meta("Contact").unwrap();
        assert_eq!(contact.name, "Contact");
        assert_eq!(contact.field("owner").unwrap().name, "owner");
        assert!(registry.access("Contact:access:Default").unwrap().is_readable);
        assert!(registry.display("Contact", "list", "Default").is_some());
        registry.validate().unwrap();
    }

    #[test]
    fn test_dangling_lookup() {
        let registry = MetaRegistry::from_json_str(
            r#"{"metas": {"A": {"fields": {"b": {"type": "lookup", "document": "B"}}}}}"#,
        )
        .unwrap();
        assert!(matches!(
            registry.validate(),
            Err(MetaError::DanglingReference { .. })
        ));
    }
}
