//! # Query Parameter Parser
//!
//! Parses REST query strings into pipeline and aggregation requests.

use std::collections::HashMap;

use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::HeaderMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::errors::{RestError, RestResult};
use crate::aggregate::{AggregationRequest, GraphConfig, KpiConfig, PivotConfig};
use crate::filter::Filter;
use crate::pipeline::FindRequest;

/// Cookie carrying the caller token when no header is sent
pub const TOKEN_COOKIE: &str = "_authTokenId";

/// Parameters shared by every read endpoint
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    pub filter: Option<Filter>,
    pub sort: Option<Value>,
    pub fields: Option<String>,
    pub limit: Option<i64>,
    pub start: Option<i64>,
    pub with_detail_fields: bool,
    pub transform_dates_to_string: bool,
    pub display_name: Option<String>,
    pub display_type: Option<String>,
    pub lang: Option<String>,
}

impl QueryParams {
    pub fn parse(params: &HashMap<String, String>) -> RestResult<Self> {
        let text = |name: &str| params.get(name).filter(|v| !v.is_empty()).cloned();
        Ok(Self {
            filter: parse_json::<Filter>(params, "filter")?,
            sort: parse_json::<Value>(params, "sort")?,
            fields: text("fields"),
            limit: parse_limit(params),
            start: parse_int(params, "start")?,
            with_detail_fields: parse_bool(params, "withDetailFields")?.unwrap_or(false),
            transform_dates_to_string: parse_bool(params, "transformDatesToString")?.unwrap_or(true),
            display_name: text("displayName"),
            display_type: text("displayType"),
            lang: text("lang"),
        })
    }

    pub fn find_request(&self, document: &str, token: Option<String>) -> FindRequest {
        let mut request = FindRequest::new(document);
        request.token = token;
        request.filter = self.filter.clone();
        request.sort = self.sort.clone();
        request.fields = self.fields.clone();
        request.limit = self.limit;
        request.start = self.start;
        request.with_detail_fields = self.with_detail_fields;
        request.transform_dates_to_string = self.transform_dates_to_string;
        request.display_name = self.display_name.clone();
        request.display_type = self.display_type.clone();
        request
    }

    pub fn aggregation_request(&self, document: &str, token: Option<String>) -> AggregationRequest {
        let mut request = AggregationRequest::new(document);
        request.token = token;
        request.filter = self.filter.clone();
        request.sort = self.sort.clone();
        request.limit = self.limit;
        request.display_name = self.display_name.clone();
        request.display_type = self.display_type.clone();
        if let Some(lang) = &self.lang {
            request.lang = lang.clone();
        }
        request
    }
}

/// `pivotConfig`; absent means an empty config, which fails validation
pub fn parse_pivot_config(params: &HashMap<String, String>) -> RestResult<PivotConfig> {
    Ok(parse_json::<PivotConfig>(params, "pivotConfig")?.unwrap_or_default())
}

/// `graphConfig`; absent is reported by graph validation
pub fn parse_graph_config(params: &HashMap<String, String>) -> RestResult<Option<GraphConfig>> {
    parse_json::<GraphConfig>(params, "graphConfig")
}

/// `kpiConfig`; required
pub fn parse_kpi_config(params: &HashMap<String, String>) -> RestResult<KpiConfig> {
    parse_json::<KpiConfig>(params, "kpiConfig")?
        .ok_or_else(|| RestError::invalid_param("kpiConfig", "is required"))
}

/// Caller token from `Authorization` (optional `Bearer `) or the token cookie
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        let token = auth.strip_prefix("Bearer ").unwrap_or(auth).trim();
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == TOKEN_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

fn parse_json<T: DeserializeOwned>(params: &HashMap<String, String>, name: &'static str) -> RestResult<Option<T>> {
    match params.get(name).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => serde_json::from_str(raw)
            .map(Some)
            .map_err(|e| RestError::invalid_param(name, e.to_string())),
    }
}

/// `limit` never fails: an unreadable value is treated as absent so the
/// default limit applies downstream
fn parse_limit(params: &HashMap<String, String>) -> Option<i64> {
    let raw = params.get("limit")?.trim();
    raw.parse::<i64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(|n| n.trunc() as i64)
    })
}

fn parse_int(params: &HashMap<String, String>, name: &'static str) -> RestResult<Option<i64>> {
    match params.get(name).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<i64>()
            .map(Some)
            .map_err(|e| RestError::invalid_param(name, e.to_string())),
    }
}

fn parse_bool(params: &HashMap<String, String>, name: &'static str) -> RestResult<Option<bool>> {
    match params.get(name).map(|v| v.trim()) {
        None | Some("") => Ok(None),
        Some("true") | Some("1") => Ok(Some(true)),
        Some("false") | Some("0") => Ok(Some(false)),
        Some(other) => Err(RestError::invalid_param(name, format!("expected a boolean, got {}", other))),
    }
}
