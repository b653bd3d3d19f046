//! # Streaming Query Pipeline
//!
//! Caller resolution, query compilation, cursor opening and the per-record
//! transform chain.
//!
//! # Modules
//! - `params`: request shape, sort and limit parsing
//! - `find`: the engine and the record stream
//! - `transforms`: per-record stages
//! - `ndjson`: line framing

pub mod errors;
pub mod find;
pub mod ndjson;
pub mod params;
pub mod transforms;

pub use errors::StreamError;
pub use find::{BuiltQuery, FindStream, QueryEngine, QuerySettings, TotalCount};
pub use ndjson::{encode_line, into_ndjson};
pub use params::{parse_field_list, parse_sort, FindRequest};
pub use transforms::{
    DateNormalizationTransform, DetailLookup, FieldPermissionTransform, HelperFieldStripTransform,
    PopulateTransform, RecordTransform, TransformChain,
};
