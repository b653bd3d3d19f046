//! # Aggregation Wire Protocol
//!
//! stdin:  one init envelope line, then one JSON record per line, then EOF.
//! stdout: one status envelope line, then the payload (JSON or SVG text).
//! stderr: free-form diagnostics.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{BridgeError, BridgeResult};

pub const JSONRPC_VERSION: &str = "2.0";

// JSON-RPC error codes used by the aggregator
pub const PARSE_ERROR: i64 = -32700;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// What the aggregator is asked to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMethod {
    Pivot,
    Graph,
    Kpi,
}

impl AggregationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationMethod::Pivot => "pivot",
            AggregationMethod::Graph => "graph",
            AggregationMethod::Kpi => "kpi",
        }
    }
}

/// Init envelope: `{"jsonrpc":"2.0","method":"pivot","params":{"config":{...}}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: AggregationMethod,
    pub params: RpcParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcParams {
    pub config: Value,
}

impl RpcRequest {
    pub fn new(method: AggregationMethod, config: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method,
            params: RpcParams { config },
        }
    }

    /// The envelope as one newline-terminated line
    pub fn to_line(&self) -> BridgeResult<String> {
        let mut line = serde_json::to_string(self).map_err(|e| BridgeError::Write {
            message: e.to_string(),
            stderr: String::new(),
        })?;
        line.push('\n');
        Ok(line)
    }
}

/// Status envelope written before the payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<RpcStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcStatus {
    pub status: String,
    #[serde(rename = "rowCount", default)]
    pub row_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorBody {
    pub code: i64,
    pub message: String,
}

impl RpcResponse {
    pub fn success(row_count: u64) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(RpcStatus {
                status: "success".to_string(),
                row_count,
            }),
            error: None,
        }
    }

    pub fn failure(code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(RpcErrorBody {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Splits stdout into the status envelope and the payload.
///
/// An error envelope is returned as [`BridgeError::Rpc`].
pub fn split_output(output: &str) -> BridgeResult<(RpcResponse, &str)> {
    let trimmed = output.trim_start_matches(['\n', '\r']);
    if trimmed.trim().is_empty() {
        return Err(BridgeError::protocol("RPC response not received"));
    }

    let (head, payload) = match trimmed.find('\n') {
        Some(at) => (&trimmed[..at], &trimmed[at + 1..]),
        None => (trimmed, ""),
    };

    let response: RpcResponse = serde_json::from_str(head.trim())
        .map_err(|e| BridgeError::protocol(format!("invalid RPC response: {}", e)))?;

    if let Some(error) = &response.error {
        return Err(BridgeError::Rpc {
            code: error.code,
            message: error.message.clone(),
            stderr: String::new(),
        });
    }
    if response.result.is_none() {
        return Err(BridgeError::protocol("RPC response carries neither result nor error"));
    }

    Ok((response, payload))
}

/// Parses a tabular payload
pub fn parse_table_payload(payload: &str) -> BridgeResult<Value> {
    let payload = payload.trim();
    if payload.is_empty() {
        return Err(BridgeError::protocol("Result data not received"));
    }
    serde_json::from_str(payload)
        .map_err(|e| BridgeError::protocol(format!("invalid result data: {}", e)))
}

/// Checks an SVG payload
pub fn parse_svg_payload(payload: &str) -> BridgeResult<String> {
    let payload = payload.trim();
    if payload.is_empty() {
        return Err(BridgeError::protocol("SVG data not received"));
    }
    if !payload.starts_with("<svg") && !payload.starts_with("<?xml") {
        return Err(BridgeError::protocol("payload is not SVG markup"));
    }
    Ok(payload.to_string())
}
