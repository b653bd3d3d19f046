//! # REST API Router
//!
//! Axum routes for the streaming and aggregation endpoints.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use super::handler::{find_stream_handler, graph_handler, kpi_handler, pivot_handler, RestState};

/// REST API server state
pub struct RestServer {
    state: Arc<RestState>,
}

impl RestServer {
    pub fn new(state: RestState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// Build the Axum router
    pub fn router(self) -> Router {
        Router::new()
            .route("/rest/stream/:document/findStream", get(find_stream_handler))
            .route("/rest/data/:document/pivot", get(pivot_handler))
            .route("/rest/data/:document/graph", get(graph_handler))
            .route("/rest/data/:document/kpi", get(kpi_handler))
            .with_state(self.state)
    }
}
