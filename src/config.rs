//! # Application Configuration
//!
//! One JSON file; every field has a default, so `{}` is a valid config
//! apart from `metadata_path`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bridge::{default_aggregator_program, ProcessSettings};
use crate::http_server::HttpServerConfig;
use crate::pipeline::QuerySettings;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("Invalid config JSON: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: HttpServerConfig,

    /// Registry file with `metas`, `access` and `displays`
    #[serde(default)]
    pub metadata_path: PathBuf,

    /// Records loaded into the in-memory store at boot
    #[serde(default)]
    pub seed_path: Option<PathBuf>,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub aggregation: AggregationConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Enables JWT callers when set
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// Fixed token to user id, for service callers and development
    #[serde(default)]
    pub static_tokens: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    #[serde(default = "default_large_result_threshold")]
    pub large_result_threshold: usize,
}

fn default_limit() -> usize {
    50
}

fn default_large_result_threshold() -> usize {
    1000
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            large_result_threshold: default_large_result_threshold(),
        }
    }
}

impl QueryConfig {
    pub fn settings(&self) -> QuerySettings {
        QuerySettings {
            default_limit: self.default_limit,
            large_result_threshold: self.large_result_threshold,
        }
    }
}

/// Where aggregation sessions run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Process,
    InProcess,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    #[serde(default)]
    pub backend: BackendKind,

    /// Program and arguments; defaults to the bundled aggregator binary
    #[serde(default)]
    pub command: Vec<String>,

    #[serde(default = "default_max_records")]
    pub max_records: usize,

    #[serde(default = "default_high_water_mark")]
    pub stdin_high_water_mark: usize,

    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    #[serde(default = "default_stderr_limit_bytes")]
    pub stderr_limit_bytes: usize,

    #[serde(default = "default_kill_timeout_ms")]
    pub kill_timeout_ms: u64,

    /// How long the aggregator may take to finish after its input ends
    #[serde(default = "default_exit_timeout_ms")]
    pub exit_timeout_ms: u64,
}

fn default_max_records() -> usize {
    100_000
}

fn default_high_water_mark() -> usize {
    16 * 1024
}

fn default_max_output_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_stderr_limit_bytes() -> usize {
    64 * 1024
}

fn default_kill_timeout_ms() -> u64 {
    250
}

fn default_exit_timeout_ms() -> u64 {
    120_000
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            command: Vec::new(),
            max_records: default_max_records(),
            stdin_high_water_mark: default_high_water_mark(),
            max_output_bytes: default_max_output_bytes(),
            stderr_limit_bytes: default_stderr_limit_bytes(),
            kill_timeout_ms: default_kill_timeout_ms(),
            exit_timeout_ms: default_exit_timeout_ms(),
        }
    }
}

impl AggregationConfig {
    pub fn process_settings(&self) -> ProcessSettings {
        let (program, args) = match self.command.split_first() {
            Some((program, args)) => (program.clone(), args.to_vec()),
            None => (default_aggregator_program(), Vec::new()),
        };
        ProcessSettings {
            program,
            args,
            stdin_high_water_mark: self.stdin_high_water_mark,
            max_output_bytes: self.max_output_bytes,
            stderr_limit_bytes: self.stderr_limit_bytes,
            kill_timeout: Duration::from_millis(self.kill_timeout_ms),
            exit_timeout: Duration::from_millis(self.exit_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load and validate configuration from file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let config = Self::from_json_str(&content)?;
        Ok(config.relative_to(path.parent().unwrap_or_else(|| Path::new("."))))
    }

    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        let config: AppConfig =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolves relative data paths against the config file's directory
    fn relative_to(mut self, base: &Path) -> Self {
        if self.metadata_path.is_relative() {
            self.metadata_path = base.join(&self.metadata_path);
        }
        if let Some(seed) = self.seed_path.take() {
            self.seed_path = Some(if seed.is_relative() { base.join(seed) } else { seed });
        }
        self
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.metadata_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("metadata_path is required".into()));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be > 0".into()));
        }
        self.server.bind_addr().map_err(ConfigError::Invalid)?;
        if self.query.default_limit == 0 {
            return Err(ConfigError::Invalid("query.default_limit must be > 0".into()));
        }
        if self.aggregation.max_records == 0 {
            return Err(ConfigError::Invalid("aggregation.max_records must be > 0".into()));
        }
        if self.aggregation.stdin_high_water_mark == 0 {
            return Err(ConfigError::Invalid(
                "aggregation.stdin_high_water_mark must be > 0".into(),
            ));
        }
        if self.aggregation.command.first().is_some_and(|p| p.trim().is_empty()) {
            return Err(ConfigError::Invalid("aggregation.command program is empty".into()));
        }
        if self.auth.jwt_secret.as_deref().is_some_and(|s| s.len() < 16) {
            return Err(ConfigError::Invalid(
                "auth.jwt_secret must be at least 16 bytes".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_json_str(r#"{"metadata_path": "meta.json"}"#).unwrap();
        assert_eq!(config.query.default_limit, 50);
        assert_eq!(config.query.large_result_threshold, 1000);
        assert_eq!(config.aggregation.max_records, 100_000);
        assert_eq!(config.aggregation.backend, BackendKind::Process);
        assert_eq!(config.log.level, "info");
        let settings = config.aggregation.process_settings();
        assert_eq!(settings.stdin_high_water_mark, 16384);
        assert_eq!(settings.kill_timeout, Duration::from_millis(250));
        assert_eq!(settings.exit_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_validation_failures() {
        assert!(AppConfig::from_json_str("{}").is_err());
        assert!(AppConfig::from_json_str(
            r#"{"metadata_path": "m.json", "aggregation": {"max_records": 0}}"#
        )
        .is_err());
        assert!(AppConfig::from_json_str(
            r#"{"metadata_path": "m.json", "auth": {"jwt_secret": "short"}}"#
        )
        .is_err());
        assert!(matches!(
            AppConfig::from_json_str("{not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aeroquery.json");
        let mut file = fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{"metadata_path": "meta.json", "seed_path": "seed.json",
                "aggregation": {{"backend": "in_process", "command": ["/opt/agg/bin/aggregate", "--strict"]}}}}"#
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.metadata_path, dir.path().join("meta.json"));
        assert_eq!(config.seed_path, Some(dir.path().join("seed.json")));
        assert_eq!(config.aggregation.backend, BackendKind::InProcess);
        let settings = config.aggregation.process_settings();
        assert_eq!(settings.program, "/opt/agg/bin/aggregate");
        assert_eq!(settings.args, vec!["--strict".to_string()]);
    }
}
