//! # REST API Handlers
//!
//! Translates HTTP requests into pipeline and aggregation calls.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::debug;

use super::errors::{RestError, RestResult};
use super::parser::{extract_token, parse_graph_config, parse_kpi_config, parse_pivot_config, QueryParams};
use crate::aggregate::{GraphOrchestrator, KpiOrchestrator, KpiResult, PivotOrchestrator, PivotResult};
use crate::pipeline::{into_ndjson, QueryEngine};

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";
pub const SVG_CONTENT_TYPE: &str = "image/svg+xml";
/// Header carrying the graph total
pub const TOTAL_HEADER: &str = "x-total-count";

/// Everything the read endpoints need
#[derive(Clone)]
pub struct RestState {
    pub engine: QueryEngine,
    pub pivot: PivotOrchestrator,
    pub graph: GraphOrchestrator,
    pub kpi: KpiOrchestrator,
}

pub type SharedState = Arc<RestState>;

/// `GET /rest/stream/:document/findStream`
pub async fn find_stream_handler(
    State(state): State<SharedState>,
    Path(document): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> RestResult<Response> {
    let params = QueryParams::parse(&query)?;
    let request = params.find_request(&document, extract_token(&headers));
    let stream = state.engine.find_stream(&request).await?;
    debug!(document = %document, "streaming NDJSON response");

    // The body owns the stream; a client disconnect drops it and the cursor
    let body = Body::from_stream(into_ndjson(stream));
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, HeaderValue::from_static(NDJSON_CONTENT_TYPE))],
        body,
    )
        .into_response())
}

/// `GET /rest/data/:document/pivot`
pub async fn pivot_handler(
    State(state): State<SharedState>,
    Path(document): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> RestResult<Json<PivotResult>> {
    let params = QueryParams::parse(&query)?;
    let config = parse_pivot_config(&query)?;
    let request = params.aggregation_request(&document, extract_token(&headers));
    let result = state.pivot.run(&request, &config).await?;
    Ok(Json(result))
}

/// `GET /rest/data/:document/kpi`
pub async fn kpi_handler(
    State(state): State<SharedState>,
    Path(document): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> RestResult<Json<KpiResult>> {
    let params = QueryParams::parse(&query)?;
    let config = parse_kpi_config(&query)?;
    let request = params.aggregation_request(&document, extract_token(&headers));
    let result = state.kpi.run(&request, &config).await?;
    Ok(Json(result))
}

/// `GET /rest/data/:document/graph`
pub async fn graph_handler(
    State(state): State<SharedState>,
    Path(document): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> RestResult<Response> {
    let params = QueryParams::parse(&query)?;
    let config = parse_graph_config(&query)?;
    let request = params.aggregation_request(&document, extract_token(&headers));
    let result = state.graph.run(&request, config.as_ref()).await?;

    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, HeaderValue::from_static(SVG_CONTENT_TYPE))],
        result.svg,
    )
        .into_response();
    if let Some(total) = result.total {
        response
            .headers_mut()
            .insert(TOTAL_HEADER, HeaderValue::from(total));
    }
    Ok(response)
}
