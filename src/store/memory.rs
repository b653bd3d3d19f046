//! # Memory Store
//!
//! Immutable snapshot of seed documents. Finds never copy the collection:
//! the cursor walks the shared snapshot and yields projected clones one
//! record at a time.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde_json::Value;
use tracing::debug;

use super::errors::{StoreError, StoreResult};
use super::matcher::parse_query;
use super::sort::RecordSorter;
use super::{DocumentStore, FindPlan, RecordStream};
use crate::filter::CompiledQuery;
use crate::record::Record;

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    collections: HashMap<String, Arc<Vec<Record>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `{ "<document>": [records...] }`
    pub fn load(path: &Path) -> StoreResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| StoreError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> StoreResult<Self> {
        let seed: HashMap<String, Vec<Value>> =
            serde_json::from_str(content).map_err(|e| StoreError::Parse(e.to_string()))?;

        let mut store = Self::new();
        for (document, values) in seed {
            let records = values
                .into_iter()
                .map(|value| match value {
                    Value::Object(map) => Ok(map),
                    other => Err(StoreError::Parse(format!(
                        "{} holds a non-object record: {}",
                        document, other
                    ))),
                })
                .collect::<StoreResult<Vec<_>>>()?;
            store.insert_records(document, records);
        }
        Ok(store)
    }

    /// Append records to a document
    pub fn insert_records(&mut self, document: impl Into<String>, records: Vec<Record>) {
        let entry = self.collections.entry(document.into()).or_default();
        Arc::make_mut(entry).extend(records);
    }

    pub fn document_len(&self, document: &str) -> usize {
        self.collections.get(document).map(|c| c.len()).unwrap_or(0)
    }

    fn snapshot(&self, document: &str) -> Arc<Vec<Record>> {
        self.collections.get(document).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(&self, document: &str, plan: FindPlan) -> StoreResult<RecordStream> {
        let predicate = parse_query(plan.query.as_value())?;
        let records = self.snapshot(document);

        let order: Vec<usize> = if plan.sort.is_empty() {
            Vec::new()
        } else {
            let mut matching: Vec<(usize, &Record)> = records
                .iter()
                .enumerate()
                .filter(|(_, r)| predicate.matches(r))
                .collect();
            matching.sort_by(|(_, a), (_, b)| RecordSorter::compare_records(a, b, &plan.sort));
            matching.into_iter().map(|(i, _)| i).collect()
        };
        debug!(document, sorted = !plan.sort.is_empty(), "cursor opened");

        let sorted = !plan.sort.is_empty();
        let skip = plan.skip;
        let limit = plan.limit.unwrap_or(usize::MAX);
        let projection = plan.projection;
        let mut position = 0usize;
        let mut skipped = 0usize;
        let mut yielded = 0usize;

        let cursor = std::iter::from_fn(move || -> Option<StoreResult<Record>> {
            while yielded < limit {
                let index = if sorted {
                    *order.get(position)?
                } else {
                    position
                };
                position += 1;
                let record = records.get(index)?;
                if !sorted && !predicate.matches(record) {
                    continue;
                }
                if skipped < skip {
                    skipped += 1;
                    continue;
                }
                yielded += 1;
                return Some(Ok(projection.apply(record)));
            }
            None
        });

        Ok(stream::iter(cursor).boxed())
    }

    async fn count(&self, document: &str, query: &CompiledQuery) -> StoreResult<u64> {
        let predicate = parse_query(query.as_value())?;
        let records = self.snapshot(document);
        Ok(records.iter().filter(|r| predicate.matches(r)).count() as u64)
    }

    async fn find_by_id(&self, document: &str, id: &str) -> StoreResult<Option<Record>> {
        Ok(self
            .collections
            .get(document)
            .and_then(|records| {
                records
                    .iter()
                    .find(|r| r.get("_id").and_then(Value::as_str) == Some(id))
            })
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Projection, SortKey};
    use futures_util::TryStreamExt;
    use serde_json::json;

    fn store() -> MemoryStore {
        MemoryStore::from_json_str(
            r#"{"Task": [
                {"_id": "1", "status": "open", "n": 3},
                {"_id": "2", "status": "done", "n": 1},
                {"_id": "3", "status": "open", "n": 2},
                {"_id": "4", "status": "open", "n": 5}
            ]}"#,
        )
        .unwrap()
    }

    fn ids(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r["_id"].as_str().unwrap()).collect()
    }

    #[tokio::test]
    async fn test_find_filters_skips_and_limits() {
        let store = store();
        let plan = FindPlan::new(CompiledQuery::from_value(json!({"status": "open"})))
            .with_skip(1)
            .with_limit(Some(1));
        let records: Vec<Record> = store.find("Task", plan).await.unwrap().try_collect().await.unwrap();
        assert_eq!(ids(&records), vec!["3"]);
    }

    #[tokio::test]
    async fn test_find_sorted_and_projected() {
        let store = store();
        let plan = FindPlan::new(CompiledQuery::match_all())
            .with_sort(vec![SortKey::desc("n")])
            .with_projection(Projection::include(["n"]));
        let records: Vec<Record> = store.find("Task", plan).await.unwrap().try_collect().await.unwrap();
        assert_eq!(ids(&records), vec!["4", "1", "3", "2"]);
        assert!(records[0].get("status").is_none());
    }

    #[tokio::test]
    async fn test_count_and_find_by_id() {
        let store = store();
        let query = CompiledQuery::from_value(json!({"n": {"$gte": 2}}));
        assert_eq!(store.count("Task", &query).await.unwrap(), 3);
        assert_eq!(store.count("Nothing", &query).await.unwrap(), 0);
        assert!(store.find_by_id("Task", "2").await.unwrap().is_some());
        assert!(store.find_by_id("Task", "9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_query_is_an_error() {
        let store = store();
        let plan = FindPlan::new(CompiledQuery::from_value(json!({"$where": "x"})));
        assert!(store.find("Task", plan).await.is_err());
    }
}
