//! CLI command implementations
//!
//! `serve` follows a fixed boot order: config, logging, metadata, store,
//! caller resolution, engine, aggregation backend, HTTP server.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use crate::aggregate::{GraphOrchestrator, KpiOrchestrator, PivotOrchestrator};
use crate::auth::{
    CallerResolver, CallerTokens, ChainedCallerResolver, JwtCallerResolver, StaticCallerResolver,
    TokenSettings, User, USER_DOCUMENT,
};
use crate::bridge::{AggregationBackend, InProcessBackend, ProcessBackend};
use crate::config::{AppConfig, BackendKind};
use crate::filter::{compile_query, Filter, FilterContext};
use crate::http_server::HttpServer;
use crate::meta::MetaRegistry;
use crate::observability::init_logging;
use crate::pipeline::QueryEngine;
use crate::rest_api::RestState;
use crate::store::{DocumentStore, MemoryStore};

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_command(cli.command)
}

/// Run a command
pub fn run_command(command: Command) -> CliResult<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match command {
        Command::Serve { config, port } => runtime.block_on(serve(&config, port)),
        Command::Compile {
            config,
            document,
            filter,
            user,
        } => {
            let output = runtime.block_on(compile(&config, &document, &filter, &user))?;
            println!("{}", output);
            Ok(())
        }
    }
}

/// Boot and serve until shutdown
pub async fn serve(config_path: &Path, port: Option<u16>) -> CliResult<()> {
    let mut config = AppConfig::load(config_path)?;
    if let Some(port) = port {
        config.server.port = port;
    }
    config.validate()?;

    init_logging(&config.log);
    info!(config = %config_path.display(), "booting aeroquery");

    let state = boot(&config).await?;
    HttpServer::new(config.server.clone(), state)
        .start()
        .await
        .map_err(|e| CliError::boot_failed(format!("server failed: {}", e)))
}

/// Compile a filter against a document and return the native query as JSON
pub async fn compile(
    config_path: &Path,
    document: &str,
    filter: &str,
    user_id: &str,
) -> CliResult<String> {
    let config = AppConfig::load(config_path)?;
    config.validate()?;

    let registry = load_registry(&config)?;
    let store = load_store(&config)?;
    let meta = registry
        .meta(document)
        .ok_or_else(|| CliError::compile_error(format!("[{}] Document not found", document)))?;

    let filter: Filter = serde_json::from_str(filter)
        .map_err(|e| CliError::compile_error(format!("invalid filter JSON: {}", e)))?;
    let user = load_user(&store, user_id).await;

    let ctx = FilterContext::new(&registry, &user);
    let compiled = compile_query(&filter, meta, &ctx)
        .map_err(|e| CliError::compile_error(e.to_string()))?;

    serde_json::to_string_pretty(compiled.as_value())
        .map_err(|e| CliError::compile_error(e.to_string()))
}

/// Assemble the shared request state from a validated config
pub async fn boot(config: &AppConfig) -> CliResult<RestState> {
    let registry = Arc::new(load_registry(config)?);
    let store = load_store(config)?;
    let store: Arc<dyn DocumentStore> = Arc::new(store);

    let mut static_resolver = StaticCallerResolver::new();
    for (token, user_id) in &config.auth.static_tokens {
        let user = load_user(store.as_ref(), user_id).await;
        static_resolver = static_resolver.with_user(token.clone(), user);
    }

    let resolver: Arc<dyn CallerResolver> = match &config.auth.jwt_secret {
        Some(secret) => {
            let tokens = CallerTokens::new(TokenSettings::new(secret.clone()));
            Arc::new(ChainedCallerResolver::new(vec![
                Arc::new(static_resolver),
                Arc::new(JwtCallerResolver::new(tokens, store.clone())),
            ]))
        }
        None => Arc::new(static_resolver),
    };

    let engine = QueryEngine::new(registry, store, resolver).with_settings(config.query.settings());

    let backend: Arc<dyn AggregationBackend> = match config.aggregation.backend {
        BackendKind::Process => {
            let settings = config.aggregation.process_settings();
            info!(program = %settings.program, "aggregation runs in a child process");
            Arc::new(ProcessBackend::new(settings))
        }
        BackendKind::InProcess => Arc::new(InProcessBackend),
    };

    let max_records = config.aggregation.max_records;
    Ok(RestState {
        pivot: PivotOrchestrator::new(engine.clone(), backend.clone()).with_max_records(max_records),
        graph: GraphOrchestrator::new(engine.clone(), backend.clone()).with_max_records(max_records),
        kpi: KpiOrchestrator::new(engine.clone(), backend).with_max_records(max_records),
        engine,
    })
}

fn load_registry(config: &AppConfig) -> CliResult<MetaRegistry> {
    let registry = MetaRegistry::load(&config.metadata_path).map_err(|e| {
        CliError::boot_failed(format!(
            "failed to load metadata {}: {}",
            config.metadata_path.display(),
            e
        ))
    })?;
    registry
        .validate()
        .map_err(|e| CliError::boot_failed(format!("invalid metadata: {}", e)))?;
    Ok(registry)
}

fn load_store(config: &AppConfig) -> CliResult<MemoryStore> {
    match &config.seed_path {
        Some(path) => MemoryStore::load(path).map_err(|e| {
            CliError::boot_failed(format!("failed to load seed {}: {}", path.display(), e))
        }),
        None => Ok(MemoryStore::new()),
    }
}

/// A stored user document, or a bare user when none exists
async fn load_user(store: &dyn DocumentStore, user_id: &str) -> User {
    match store.find_by_id(USER_DOCUMENT, user_id).await {
        Ok(Some(record)) => match User::from_record(record) {
            Ok(user) => user,
            Err(err) => {
                warn!(user = %user_id, error = %err, "unusable user document");
                User::new(user_id)
            }
        },
        Ok(None) => User::new(user_id),
        Err(err) => {
            warn!(user = %user_id, error = %err, "user lookup failed");
            User::new(user_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::fs;
    use tempfile::TempDir;

    fn write_fixture(dir: &TempDir) -> std::path::PathBuf {
        let metadata = json!({
            "metas": {
                "Deal": {
                    "fields": {
                        "status": {"type": "picklist"},
                        "amount": {"type": "money"}
                    }
                }
            }
        });
        let seed = json!({
            "User": [{"_id": "u1", "name": "Ana", "group": {"_id": "g1"}}],
            "Deal": [{"_id": "d1", "status": "Open", "_user": [{"_id": "u1"}]}]
        });
        fs::write(dir.path().join("metadata.json"), metadata.to_string()).unwrap();
        fs::write(dir.path().join("seed.json"), seed.to_string()).unwrap();

        let config = json!({
            "metadata_path": "metadata.json",
            "seed_path": "seed.json",
            "auth": {"static_tokens": {"tok": "u1"}},
            "aggregation": {"backend": "in_process"}
        });
        let path = dir.path().join("aeroquery.json");
        fs::write(&path, config.to_string()).unwrap();
        path
    }

    #[tokio::test]
    async fn test_compile_command() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir);
        let filter = r#"{"match":"and","conditions":[{"term":"status","operator":"equals","value":"Open"}]}"#;

        let output = compile(&path, "Deal", filter, "u1").await.unwrap();
        let query: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(query["status"], "Open");
    }

    #[tokio::test]
    async fn test_compile_unknown_document() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir);

        let err = compile(&path, "Nope", "{}", "u1").await.unwrap_err();
        assert_eq!(err.code(), crate::cli::CliErrorCode::CompileError);
    }

    #[tokio::test]
    async fn test_boot_builds_state() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir);
        let config = AppConfig::load(&path).unwrap();
        config.validate().unwrap();

        assert!(boot(&config).await.is_ok());
    }

    #[tokio::test]
    async fn test_boot_missing_metadata() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig {
            metadata_path: dir.path().join("absent.json"),
            ..Default::default()
        };
        let err = boot(&config).await.err().unwrap();
        assert!(err.message().contains("failed to load metadata"));
    }
}
