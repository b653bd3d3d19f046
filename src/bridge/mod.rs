//! # Aggregation Bridge
//!
//! Request-scoped aggregation sessions: an init envelope, the record
//! stream, then one payload back. [`AggregationBackend`] is the seam the
//! orchestrators depend on.

pub mod backend;
pub mod errors;
pub mod process;
pub mod protocol;

pub use backend::{
    AggregationBackend, AggregationInit, AggregationOutput, AggregationRecords, InProcessBackend,
    ProcessBackend,
};
pub use errors::{BridgeError, BridgeResult};
pub use process::{default_aggregator_program, AggregationProcess, ProcessSettings, AGGREGATOR_BINARY};
pub use protocol::{AggregationMethod, RpcRequest, RpcResponse};
