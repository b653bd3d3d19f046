//! # Document Store
//!
//! The store port the query pipeline reads through, and an in-memory
//! adapter evaluating the native query dialect.
//!
//! # Modules
//! - `matcher`: native query to predicate
//! - `projection`: field projections
//! - `sort`: record ordering
//! - `memory`: the seed-backed store

pub mod errors;
pub mod matcher;
pub mod memory;
pub mod projection;
pub mod sort;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::filter::CompiledQuery;
use crate::record::Record;

pub use errors::{StoreError, StoreResult};
pub use matcher::parse_query;
pub use memory::MemoryStore;
pub use projection::Projection;
pub use sort::{RecordSorter, SortDirection, SortKey};

/// A cursor over matching records. Dropping it closes the cursor.
pub type RecordStream = BoxStream<'static, StoreResult<Record>>;

/// Everything one find needs
#[derive(Debug, Clone)]
pub struct FindPlan {
    pub query: CompiledQuery,
    pub sort: Vec<SortKey>,
    pub skip: usize,
    pub limit: Option<usize>,
    pub projection: Projection,
}

impl FindPlan {
    pub fn new(query: CompiledQuery) -> Self {
        Self {
            query,
            sort: Vec::new(),
            skip: 0,
            limit: None,
            projection: Projection::All,
        }
    }

    pub fn with_sort(mut self, sort: Vec<SortKey>) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }
}

/// Read access to documents
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Open a cursor; records are produced one at a time
    async fn find(&self, document: &str, plan: FindPlan) -> StoreResult<RecordStream>;

    async fn count(&self, document: &str, query: &CompiledQuery) -> StoreResult<u64>;

    async fn find_by_id(&self, document: &str, id: &str) -> StoreResult<Option<Record>>;
}
