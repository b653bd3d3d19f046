//! # Transform Stages
//!
//! One-record-in, one-record-out stages applied in order to every record
//! leaving the cursor. Stages mutate the record in place and never hold
//! more than the record they are given.
//!
//! Masking runs first so no later stage can copy a masked field into a
//! derived value.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::trace;

use super::errors::StreamError;
use crate::access::AccessProjection;
use crate::meta::MetaObject;
use crate::record::{normalize_record_dates, root_segment, Record};
use crate::store::DocumentStore;

/// A per-record stage
#[async_trait]
pub trait RecordTransform: Send + Sync {
    fn name(&self) -> &'static str;

    async fn apply(&self, record: &mut Record) -> Result<(), StreamError>;
}

/// Removes fields whose READ condition fails on the record
pub struct FieldPermissionTransform {
    access: Arc<AccessProjection>,
}

impl FieldPermissionTransform {
    pub fn new(access: Arc<AccessProjection>) -> Self {
        Self { access }
    }
}

#[async_trait]
impl RecordTransform for FieldPermissionTransform {
    fn name(&self) -> &'static str {
        "field_permission"
    }

    async fn apply(&self, record: &mut Record) -> Result<(), StreamError> {
        self.access.mask(record)?;
        Ok(())
    }
}

/// Drops fields fetched only to evaluate conditions
pub struct HelperFieldStripTransform {
    access: Arc<AccessProjection>,
}

impl HelperFieldStripTransform {
    pub fn new(access: Arc<AccessProjection>) -> Self {
        Self { access }
    }
}

#[async_trait]
impl RecordTransform for HelperFieldStripTransform {
    fn name(&self) -> &'static str {
        "helper_field_strip"
    }

    async fn apply(&self, record: &mut Record) -> Result<(), StreamError> {
        self.access.strip_helpers(record);
        Ok(())
    }
}

/// A lookup field and the referenced fields to merge in
#[derive(Debug, Clone, PartialEq)]
pub struct DetailLookup {
    pub field: String,
    pub document: String,
    /// Dotted entries merge their whole top-level value
    pub detail_fields: Vec<String>,
}

/// Merges `detailFields` of referenced documents into lookup values
pub struct PopulateTransform {
    store: Arc<dyn DocumentStore>,
    lookups: Vec<DetailLookup>,
}

impl PopulateTransform {
    pub fn new(store: Arc<dyn DocumentStore>, meta: &MetaObject) -> Self {
        let lookups = meta
            .fields
            .iter()
            .filter(|(_, field)| field.is_lookup() && !field.detail_fields.is_empty())
            .filter_map(|(name, field)| {
                Some(DetailLookup {
                    field: name.clone(),
                    document: field.document.clone()?,
                    detail_fields: field.detail_fields.clone(),
                })
            })
            .collect();
        Self { store, lookups }
    }

    /// Populates an explicit set of lookups
    pub fn with_lookups(store: Arc<dyn DocumentStore>, lookups: Vec<DetailLookup>) -> Self {
        Self { store, lookups }
    }

    pub fn is_empty(&self) -> bool {
        self.lookups.is_empty()
    }

    async fn populate(&self, lookup: &DetailLookup, target: &mut Map<String, Value>) -> Result<(), StreamError> {
        let Some(id) = target.get("_id").and_then(Value::as_str).map(str::to_string) else {
            return Ok(());
        };
        let referenced = self
            .store
            .find_by_id(&lookup.document, &id)
            .await
            .map_err(|e| StreamError::Populate {
                field: lookup.field.clone(),
                message: e.to_string(),
            })?;
        if let Some(referenced) = referenced {
            for detail in &lookup.detail_fields {
                let root = root_segment(detail);
                if let Some(value) = referenced.get(root) {
                    target.insert(root.to_string(), value.clone());
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RecordTransform for PopulateTransform {
    fn name(&self) -> &'static str {
        "populate"
    }

    async fn apply(&self, record: &mut Record) -> Result<(), StreamError> {
        for lookup in &self.lookups {
            match record.get_mut(&lookup.field) {
                Some(Value::Object(target)) => self.populate(lookup, target).await?,
                Some(Value::Array(items)) => {
                    for item in items.iter_mut() {
                        if let Value::Object(target) = item {
                            self.populate(lookup, target).await?;
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Rewrites native dates into canonical strings
pub struct DateNormalizationTransform;

#[async_trait]
impl RecordTransform for DateNormalizationTransform {
    fn name(&self) -> &'static str {
        "date_normalization"
    }

    async fn apply(&self, record: &mut Record) -> Result<(), StreamError> {
        normalize_record_dates(record);
        Ok(())
    }
}

/// Ordered stages
#[derive(Default)]
pub struct TransformChain {
    stages: Vec<Box<dyn RecordTransform>>,
}

impl TransformChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, stage: impl RecordTransform + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub async fn run(&self, mut record: Record) -> Result<Record, StreamError> {
        for stage in &self.stages {
            stage.apply(&mut record).await?;
            trace!(stage = stage.name(), "stage applied");
        }
        Ok(record)
    }
}
