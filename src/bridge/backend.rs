//! Aggregation backends.
//!
//! Orchestrators hand an [`AggregationInit`] and a record stream to an
//! [`AggregationBackend`] and get the finished payload back. The process
//! backend runs the aggregator binary over pipes; the in-process backend
//! runs the same engine on the current task.

use std::time::Instant;

use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use serde_json::Value;
use tracing::{error, info};

use super::errors::{BridgeError, BridgeResult};
use super::process::{AggregationProcess, ProcessSettings};
use super::protocol::AggregationMethod;
use crate::aggregate::engine::Session;
use crate::pipeline::StreamError;
use crate::record::Record;

/// Records fed into one aggregation session
pub type AggregationRecords = BoxStream<'static, Result<Record, StreamError>>;

/// What to aggregate and how
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationInit {
    pub method: AggregationMethod,
    pub config: Value,
}

impl AggregationInit {
    pub fn pivot(config: Value) -> Self {
        Self {
            method: AggregationMethod::Pivot,
            config,
        }
    }

    pub fn graph(config: Value) -> Self {
        Self {
            method: AggregationMethod::Graph,
            config,
        }
    }

    pub fn kpi(config: Value) -> Self {
        Self {
            method: AggregationMethod::Kpi,
            config,
        }
    }
}

/// Finished payload
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationOutput {
    Table(Value),
    Svg(String),
}

impl AggregationOutput {
    pub fn into_table(self) -> BridgeResult<Value> {
        match self {
            AggregationOutput::Table(value) => Ok(value),
            AggregationOutput::Svg(_) => Err(BridgeError::protocol("expected table, got SVG")),
        }
    }

    pub fn into_svg(self) -> BridgeResult<String> {
        match self {
            AggregationOutput::Svg(svg) => Ok(svg),
            AggregationOutput::Table(_) => Err(BridgeError::protocol("expected SVG, got table")),
        }
    }
}

#[async_trait]
pub trait AggregationBackend: Send + Sync {
    async fn run(
        &self,
        init: AggregationInit,
        records: AggregationRecords,
    ) -> BridgeResult<AggregationOutput>;
}

/// Runs each session in a fresh aggregator process
#[derive(Debug, Clone, Default)]
pub struct ProcessBackend {
    settings: ProcessSettings,
}

impl ProcessBackend {
    pub fn new(settings: ProcessSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ProcessSettings {
        &self.settings
    }

    async fn session(
        &self,
        process: &mut AggregationProcess,
        init: AggregationInit,
        records: AggregationRecords,
    ) -> BridgeResult<AggregationOutput> {
        process.send_rpc_request(init.method, init.config).await?;
        process.stream_records(records).await?;
        match init.method {
            AggregationMethod::Pivot | AggregationMethod::Kpi => {
                process.collect_result().await.map(AggregationOutput::Table)
            }
            AggregationMethod::Graph => process.collect_svg().await.map(AggregationOutput::Svg),
        }
    }
}

#[async_trait]
impl AggregationBackend for ProcessBackend {
    async fn run(
        &self,
        init: AggregationInit,
        records: AggregationRecords,
    ) -> BridgeResult<AggregationOutput> {
        let started = Instant::now();
        let method = init.method;
        let mut process = AggregationProcess::spawn(self.settings.clone())?;
        let pid = process.id();

        match self.session(&mut process, init, records).await {
            Ok(output) => {
                info!(
                    pid = ?pid,
                    method = method.as_str(),
                    records = process.records_sent(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "aggregation session finished"
                );
                Ok(output)
            }
            Err(err) => {
                // Every bridge error path has already killed the process
                error!(
                    pid = ?pid,
                    method = method.as_str(),
                    records = process.records_sent(),
                    kill_attempts = process.kill_attempts(),
                    error = %err,
                    "aggregation session failed"
                );
                Err(err)
            }
        }
    }
}

/// Runs the aggregation engine without a subprocess
#[derive(Debug, Clone, Copy, Default)]
pub struct InProcessBackend;

#[async_trait]
impl AggregationBackend for InProcessBackend {
    async fn run(
        &self,
        init: AggregationInit,
        mut records: AggregationRecords,
    ) -> BridgeResult<AggregationOutput> {
        let started = Instant::now();
        let mut session = Session::start(init.method, &init.config).map_err(|e| BridgeError::Rpc {
            code: e.rpc_code(),
            message: e.to_string(),
            stderr: String::new(),
        })?;

        while let Some(item) = records.next().await {
            let record = item.map_err(|e| BridgeError::Upstream(e.to_string()))?;
            session.push(&record);
        }

        let rows = session.rows();
        let output = session.finish();
        info!(
            method = init.method.as_str(),
            records = rows,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "in-process aggregation finished"
        );
        Ok(output)
    }
}
