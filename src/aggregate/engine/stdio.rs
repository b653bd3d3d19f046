//! Line protocol driver for the aggregator binary.
//!
//! Line one is the init envelope, every following non-blank line is one
//! record, and EOF ends the stream. The reply is a status envelope line
//! followed by the payload.

use std::io::{BufRead, Write};

use serde_json::Value;
use tracing::{debug, error};

use super::{EngineError, Session};
use crate::bridge::protocol::{AggregationMethod, RpcResponse, JSONRPC_VERSION};
use crate::bridge::AggregationOutput;
use crate::record::Record;

/// Runs one session; returns the number of records consumed
pub fn run_stdio<R: BufRead, W: Write>(input: R, mut output: W) -> Result<u64, EngineError> {
    match aggregate(input) {
        Ok((rows, payload)) => {
            write_reply(&mut output, &RpcResponse::success(rows), Some(&payload))?;
            debug!(rows, "aggregation written");
            Ok(rows)
        }
        Err(err) => {
            error!(code = err.rpc_code(), error = %err, "aggregation failed");
            write_reply(&mut output, &RpcResponse::failure(err.rpc_code(), err.to_string()), None)?;
            Err(err)
        }
    }
}

fn aggregate<R: BufRead>(input: R) -> Result<(u64, String), EngineError> {
    let mut lines = input.lines();
    let init = loop {
        match lines.next() {
            Some(line) => {
                let line = line.map_err(|e| EngineError::Internal(e.to_string()))?;
                if !line.trim().is_empty() {
                    break line;
                }
            }
            None => return Err(EngineError::InvalidParams("init request not received".to_string())),
        }
    };

    let (method, config) = parse_init(&init)?;
    let mut session = Session::start(method, &config)?;
    debug!(method = method.as_str(), "aggregation session started");

    for line in lines {
        let line = line.map_err(|e| EngineError::Internal(e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Record = serde_json::from_str(&line)
            .map_err(|e| EngineError::Parse(format!("invalid record: {}", e)))?;
        session.push(&record);
    }

    let rows = session.rows();
    let payload = match session.finish() {
        AggregationOutput::Table(value) => {
            serde_json::to_string(&value).map_err(|e| EngineError::Internal(e.to_string()))?
        }
        AggregationOutput::Svg(svg) => svg,
    };
    Ok((rows, payload))
}

fn parse_init(line: &str) -> Result<(AggregationMethod, Value), EngineError> {
    let envelope: Value =
        serde_json::from_str(line).map_err(|e| EngineError::Parse(format!("invalid init request: {}", e)))?;
    if envelope.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err(EngineError::InvalidParams("jsonrpc must be \"2.0\"".to_string()));
    }
    let method = match envelope.get("method").and_then(Value::as_str) {
        Some("pivot") => AggregationMethod::Pivot,
        Some("graph") => AggregationMethod::Graph,
        Some("kpi") => AggregationMethod::Kpi,
        Some(other) => return Err(EngineError::MethodNotFound(other.to_string())),
        None => return Err(EngineError::MethodNotFound(String::new())),
    };
    let config = envelope
        .get("params")
        .and_then(|p| p.get("config"))
        .cloned()
        .unwrap_or(Value::Null);
    Ok((method, config))
}

fn write_reply<W: Write>(
    output: &mut W,
    status: &RpcResponse,
    payload: Option<&str>,
) -> Result<(), EngineError> {
    let io = |e: std::io::Error| EngineError::Internal(e.to_string());
    let head = serde_json::to_string(status).map_err(|e| EngineError::Internal(e.to_string()))?;
    writeln!(output, "{}", head).map_err(io)?;
    if let Some(payload) = payload {
        writeln!(output, "{}", payload).map_err(io)?;
    }
    output.flush().map_err(io)
}
