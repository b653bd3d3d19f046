//! Pivot, graph and KPI aggregation tests
//!
//! Runs the orchestrators over the streaming pipeline with both the
//! in-process engine and the real `aeroquery-aggregator` binary, and
//! checks the bridge's failure handling with shell scripts standing in
//! for a broken aggregator.

use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream;
use serde_json::{json, Value};

use aeroquery::aggregate::{
    AggregationError, AggregationRequest, GraphConfig, GraphOrchestrator, KpiConfig, KpiOrchestrator,
    PivotConfig, PivotOrchestrator, EMPTY_SVG,
};
use aeroquery::auth::{StaticCallerResolver, User};
use aeroquery::bridge::{
    AggregationBackend, AggregationInit, AggregationMethod, AggregationOutput, AggregationProcess,
    AggregationRecords, BridgeError, BridgeResult, InProcessBackend, ProcessBackend, ProcessSettings,
};
use aeroquery::errors::QueryError;
use aeroquery::filter::CompiledQuery;
use aeroquery::meta::MetaRegistry;
use aeroquery::pipeline::{QueryEngine, StreamError};
use aeroquery::record::Record;
use aeroquery::store::{DocumentStore, FindPlan, MemoryStore, RecordStream, StoreResult};

const AGGREGATOR: &str = env!("CARGO_BIN_EXE_aeroquery-aggregator");

// =============================================================================
// FIXTURES
// =============================================================================

/// Memory store counting opened cursors
struct CountingStore {
    inner: MemoryStore,
    finds: AtomicUsize,
}

#[async_trait]
impl DocumentStore for CountingStore {
    async fn find(&self, document: &str, plan: FindPlan) -> StoreResult<RecordStream> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        self.inner.find(document, plan).await
    }

    async fn count(&self, document: &str, query: &CompiledQuery) -> StoreResult<u64> {
        self.inner.count(document, query).await
    }

    async fn find_by_id(&self, document: &str, id: &str) -> StoreResult<Option<Record>> {
        self.inner.find_by_id(document, id).await
    }
}

fn rec(value: Value) -> Record {
    value.as_object().cloned().unwrap()
}

fn store(records: Vec<Value>) -> Arc<CountingStore> {
    let mut inner = MemoryStore::new();
    inner.insert_records("Sale", records.into_iter().map(rec).collect());
    Arc::new(CountingStore {
        inner,
        finds: AtomicUsize::new(0),
    })
}

fn engine(store: Arc<CountingStore>) -> QueryEngine {
    let registry = MetaRegistry::from_json_str(
        r#"{
        "metas": {
            "Sale": {
                "label": {"en": "Sales", "pt_BR": "Vendas"},
                "fields": {
                    "region": {"type": "text", "label": {"en": "Region"}},
                    "city": {"type": "text", "label": {"en": "City"}},
                    "amount": {"type": "number", "label": {"en": "Amount"}},
                    "soldAt": {"type": "date"}
                }
            }
        },
        "access": {
            "Default:access:Default": {"isReadable": true, "fieldDefaults": {"isReadable": true}}
        }
    }"#,
    )
    .unwrap();
    let resolver = StaticCallerResolver::new().with_user("tok", User::new("u1"));
    QueryEngine::new(Arc::new(registry), store, Arc::new(resolver))
}

fn three_sales() -> Vec<Value> {
    vec![
        json!({"_id": "s1", "region": "North", "city": "Alta", "amount": 10}),
        json!({"_id": "s2", "region": "North", "city": "Beira", "amount": 5}),
        json!({"_id": "s3", "region": "South", "city": "Costa", "amount": 7}),
    ]
}

fn two_level_pivot(aggregator: &str) -> PivotConfig {
    serde_json::from_value(json!({
        "rows": [{"field": "region"}, {"field": "city"}],
        "values": [{"field": "amount", "aggregator": aggregator}]
    }))
    .unwrap()
}

fn aggregator_backend() -> Arc<dyn AggregationBackend> {
    Arc::new(ProcessBackend::new(
        ProcessSettings::default().with_command(AGGREGATOR, Vec::new()),
    ))
}

fn graph_code(err: &QueryError) -> String {
    match err {
        QueryError::Aggregation(inner) => inner.code().to_string(),
        other => format!("unexpected {:?}", other),
    }
}

// =============================================================================
// PIVOT
// =============================================================================

#[tokio::test]
async fn test_two_row_pivot_totals_roll_up() {
    let orchestrator = PivotOrchestrator::new(engine(store(three_sales())), Arc::new(InProcessBackend));
    let request = AggregationRequest::new("Sale").with_token("tok");

    let result = orchestrator.run(&request, &two_level_pivot("sum")).await.unwrap();

    assert!(result.success);
    assert_eq!(result.total, 3);
    assert!(result.limit_info.is_none());
    let rows = result.data.as_array().unwrap();
    assert_eq!(rows.len(), 2);

    for row in rows {
        let children = row["children"].as_array().unwrap();
        let child_sum: f64 = children
            .iter()
            .map(|c| c["totals"]["amount"].as_f64().unwrap())
            .sum();
        assert_eq!(row["totals"]["amount"].as_f64().unwrap(), child_sum);
    }
    assert_eq!(rows[0]["label"], "North");
    assert_eq!(rows[0]["totals"]["amount"], json!(15.0));
    assert_eq!(rows[1]["totals"]["amount"], json!(7.0));
    assert_eq!(result.grand_totals["totals"]["amount"], json!(22.0));
    assert_eq!(result.metadata.rows[0].label, "Region");
}

#[tokio::test]
async fn test_parent_totals_for_every_aggregator() {
    let sales = vec![
        json!({"_id": "s1", "region": "North", "city": "Alta", "amount": 10}),
        json!({"_id": "s2", "region": "North", "city": "Beira", "amount": 4}),
        json!({"_id": "s3", "region": "North", "city": "Beira", "amount": 1}),
        json!({"_id": "s4", "region": "South", "city": "Costa", "amount": 7}),
    ];
    let north = [10.0, 4.0, 1.0];
    let expected = [
        ("sum", 15.0),
        ("count", 3.0),
        ("avg", 5.0),
        ("min", 1.0),
        ("max", 10.0),
    ];

    let orchestrator = PivotOrchestrator::new(engine(store(sales)), Arc::new(InProcessBackend));
    let request = AggregationRequest::new("Sale").with_token("tok");
    for (aggregator, total) in expected {
        let result = orchestrator
            .run(&request, &two_level_pivot(aggregator))
            .await
            .unwrap();
        assert_eq!(
            result.data[0]["totals"]["amount"],
            json!(total),
            "{} over {:?}",
            aggregator,
            north
        );
    }
}

#[tokio::test]
async fn test_aggregator_binary_matches_in_process_engine() {
    let config = two_level_pivot("sum");
    let request = AggregationRequest::new("Sale").with_token("tok");

    let local = PivotOrchestrator::new(engine(store(three_sales())), Arc::new(InProcessBackend))
        .run(&request, &config)
        .await
        .unwrap();
    let remote = PivotOrchestrator::new(engine(store(three_sales())), aggregator_backend())
        .run(&request, &config)
        .await
        .unwrap();

    assert_eq!(local, remote);
}

#[tokio::test]
async fn test_pivot_reports_truncation() {
    let orchestrator = PivotOrchestrator::new(engine(store(three_sales())), Arc::new(InProcessBackend))
        .with_max_records(2);
    let result = orchestrator
        .run(&AggregationRequest::new("Sale").with_token("tok"), &two_level_pivot("count"))
        .await
        .unwrap();

    let info = result.limit_info.unwrap();
    assert!(info.limited);
    assert_eq!(info.limit, 2);
    assert_eq!(info.total, 3);
    assert_eq!(result.grand_totals["totals"]["amount"], json!(2.0));
}

#[tokio::test]
async fn test_pivot_over_nothing_starts_no_session() {
    let backend = aggregator_backend();
    let orchestrator = PivotOrchestrator::new(engine(store(Vec::new())), backend);
    let result = orchestrator
        .run(&AggregationRequest::new("Sale").with_token("tok"), &two_level_pivot("sum"))
        .await
        .unwrap();
    assert_eq!(result.data, json!([]));
    assert_eq!(result.total, 0);
}

#[tokio::test]
async fn test_invalid_pivot_runs_no_query() {
    let store = store(three_sales());
    let orchestrator = PivotOrchestrator::new(engine(store.clone()), Arc::new(InProcessBackend));
    let err = orchestrator
        .run(&AggregationRequest::new("Sale").with_token("tok"), &PivotConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QueryError::Aggregation(AggregationError::PivotRowsMissing)
    ));
    assert_eq!(err.status_code(), 400);
    assert_eq!(store.finds.load(Ordering::SeqCst), 0);
}

// =============================================================================
// GRAPH
// =============================================================================

fn graph(value: Value) -> GraphConfig {
    serde_json::from_value(value).unwrap()
}

#[tokio::test]
async fn test_graph_validation_runs_before_any_query() {
    let store = store(three_sales());
    let orchestrator = GraphOrchestrator::new(engine(store.clone()), Arc::new(InProcessBackend));
    let request = AggregationRequest::new("Sale").with_token("tok");

    let cases = [
        (None, "GRAPH_CONFIG_MISSING"),
        (Some(graph(json!({}))), "GRAPH_CONFIG_TYPE_MISSING"),
        (Some(graph(json!({"type": "bar"}))), "GRAPH_CONFIG_AXIS_X_MISSING"),
        (
            Some(graph(json!({"type": "scatter", "xAxis": {"field": "amount"}}))),
            "GRAPH_CONFIG_AXIS_Y_MISSING",
        ),
        (Some(graph(json!({"type": "pie"}))), "GRAPH_CONFIG_CATEGORY_MISSING"),
        (
            Some(graph(json!({"type": "bar", "xAxis": {"field": "vanished"}}))),
            "GRAPH_FIELD_NOT_FOUND",
        ),
    ];
    for (config, code) in cases {
        let err = orchestrator.run(&request, config.as_ref()).await.unwrap_err();
        assert_eq!(graph_code(&err), code);
        assert_eq!(err.status_code(), 400);
    }
    assert_eq!(store.finds.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_bar_chart_through_aggregator_binary() {
    let orchestrator = GraphOrchestrator::new(engine(store(three_sales())), aggregator_backend());
    let config = graph(json!({"type": "bar", "xAxis": {"field": "region"}}));

    let result = orchestrator
        .run(&AggregationRequest::new("Sale").with_token("tok"), Some(&config))
        .await
        .unwrap();

    assert!(result.svg.starts_with("<svg"));
    assert!(result.svg.contains("Sales by Region"));
    assert_eq!(result.total, Some(3));
}

#[tokio::test]
async fn test_graph_over_nothing_is_empty_svg() {
    let orchestrator = GraphOrchestrator::new(engine(store(Vec::new())), aggregator_backend());
    let config = graph(json!({"type": "pie", "categoryField": "region"}));
    let result = orchestrator
        .run(&AggregationRequest::new("Sale").with_token("tok"), Some(&config))
        .await
        .unwrap();
    assert_eq!(result.svg, EMPTY_SVG);
    assert_eq!(result.total, Some(0));
}

#[cfg(unix)]
#[tokio::test]
async fn test_failing_aggregator_becomes_processing_error() {
    let backend = Arc::new(ProcessBackend::new(ProcessSettings::shell(
        "cat > /dev/null; echo 'renderer exploded' >&2; exit 3",
    )));
    let orchestrator = GraphOrchestrator::new(engine(store(three_sales())), backend);
    let config = graph(json!({"type": "bar", "xAxis": {"field": "region"}}));

    let err = orchestrator
        .run(&AggregationRequest::new("Sale").with_token("tok"), Some(&config))
        .await
        .unwrap_err();

    assert_eq!(graph_code(&err), "GRAPH_PROCESSING_ERROR");
    assert_eq!(err.status_code(), 500);
    assert!(err.details().unwrap().contains("renderer exploded"));
}

// =============================================================================
// KPI
// =============================================================================

/// Backend that records being asked to aggregate and refuses
#[derive(Default)]
struct RefusingBackend {
    runs: AtomicUsize,
}

#[async_trait]
impl AggregationBackend for RefusingBackend {
    async fn run(&self, _init: AggregationInit, _records: AggregationRecords) -> BridgeResult<AggregationOutput> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Err(BridgeError::protocol("no session expected"))
    }
}

fn kpi(value: Value) -> KpiConfig {
    serde_json::from_value(value).unwrap()
}

#[tokio::test]
async fn test_kpi_count_comes_from_the_total() {
    let backend = Arc::new(RefusingBackend::default());
    let orchestrator = KpiOrchestrator::new(engine(store(three_sales())), backend.clone());
    let mut request = AggregationRequest::new("Sale").with_token("tok");
    request.limit = Some(1);

    let result = orchestrator
        .run(&request, &kpi(json!({"operation": "count"})))
        .await
        .unwrap();

    assert_eq!(result.value, 3.0);
    assert_eq!(result.count, 3);
    assert_eq!(result.valid_count, None);
    assert_eq!(backend.runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_kpi_count_over_nothing_is_zero() {
    let orchestrator = KpiOrchestrator::new(engine(store(Vec::new())), Arc::new(RefusingBackend::default()));
    let result = orchestrator
        .run(&AggregationRequest::new("Sale").with_token("tok"), &kpi(json!({"operation": "count"})))
        .await
        .unwrap();
    assert_eq!(result.value, 0.0);
    assert_eq!(result.count, 0);
}

#[tokio::test]
async fn test_kpi_operations_in_process_and_through_binary() {
    let mut sales = three_sales();
    sales.push(json!({"_id": "s4", "region": "West", "city": "Duna"}));
    let expected = [("sum", 22.0), ("avg", 7.3333), ("min", 5.0), ("max", 10.0)];
    let request = AggregationRequest::new("Sale").with_token("tok");

    for backend in [Arc::new(InProcessBackend) as Arc<dyn AggregationBackend>, aggregator_backend()] {
        let orchestrator = KpiOrchestrator::new(engine(store(sales.clone())), backend);
        for (operation, value) in expected {
            let result = orchestrator
                .run(&request, &kpi(json!({"operation": operation, "field": "amount"})))
                .await
                .unwrap();
            assert!(result.success);
            assert_eq!(result.value, value, "{}", operation);
            assert_eq!(result.count, 4);
            assert_eq!(result.valid_count, Some(3));
        }
    }
}

#[tokio::test]
async fn test_kpi_over_empty_stream_starts_no_session() {
    let backend = Arc::new(RefusingBackend::default());
    let orchestrator = KpiOrchestrator::new(engine(store(Vec::new())), backend.clone());
    let result = orchestrator
        .run(
            &AggregationRequest::new("Sale").with_token("tok"),
            &kpi(json!({"operation": "avg", "field": "amount"})),
        )
        .await
        .unwrap();

    assert_eq!(result.value, 0.0);
    assert_eq!(result.count, 0);
    assert_eq!(result.valid_count, Some(0));
    assert_eq!(backend.runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_kpi_without_field_runs_no_query() {
    let store = store(three_sales());
    let orchestrator = KpiOrchestrator::new(engine(store.clone()), Arc::new(InProcessBackend));
    let err = orchestrator
        .run(&AggregationRequest::new("Sale").with_token("tok"), &kpi(json!({"operation": "max"})))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QueryError::Aggregation(AggregationError::KpiFieldMissing("max"))
    ));
    assert_eq!(err.code(), "KPI_CONFIG_INVALID");
    assert_eq!(store.finds.load(Ordering::SeqCst), 0);
}

// =============================================================================
// BRIDGE
// =============================================================================

#[cfg(unix)]
#[tokio::test]
async fn test_aggregator_stderr_reaches_the_error() {
    let backend = Arc::new(ProcessBackend::new(ProcessSettings::shell(
        "cat > /dev/null; echo 'out of memory' >&2; exit 1",
    )));
    let orchestrator = PivotOrchestrator::new(engine(store(three_sales())), backend);

    let err = orchestrator
        .run(&AggregationRequest::new("Sale").with_token("tok"), &two_level_pivot("sum"))
        .await
        .unwrap_err();

    match &err {
        QueryError::Bridge(BridgeError::Exit { stderr, .. }) => {
            assert!(stderr.contains("out of memory"))
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(err.to_string().contains("out of memory"));
    assert_eq!(err.status_code(), 500);
}

#[cfg(unix)]
#[tokio::test]
async fn test_upstream_failure_kills_process_once() {
    let mut process = AggregationProcess::spawn(ProcessSettings::shell("cat > /dev/null")).unwrap();
    process
        .send_rpc_request(AggregationMethod::Pivot, json!({}))
        .await
        .unwrap();

    let records = stream::iter(vec![
        Ok(rec(json!({"_id": "1"}))),
        Err(StreamError::Encode("cursor lost".into())),
        Ok(rec(json!({"_id": "2"}))),
    ]);
    let err = process.stream_records(records).await.unwrap_err();

    assert!(matches!(err, BridgeError::Upstream(_)));
    assert_eq!(process.records_sent(), 1);
    assert!(process.is_terminated());
    assert_eq!(process.kill_attempts(), 1);

    process.kill().await;
    assert_eq!(process.kill_attempts(), 1);
}

#[test]
fn test_aggregator_binary_line_protocol() {
    let mut child = Command::new(AGGREGATOR)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    {
        let mut stdin = child.stdin.take().unwrap();
        writeln!(
            stdin,
            r#"{{"jsonrpc":"2.0","method":"pivot","params":{{"config":{{"rows":[{{"field":"region"}}],"values":[{{"field":"amount","aggregator":"sum"}}]}}}}}}"#
        )
        .unwrap();
        writeln!(stdin, r#"{{"region":"North","amount":2}}"#).unwrap();
        writeln!(stdin).unwrap();
        writeln!(stdin, r#"{{"region":"North","amount":3}}"#).unwrap();
    }
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let mut lines = stdout.lines();
    let status: Value = serde_json::from_str(lines.next().unwrap()).unwrap();
    assert_eq!(status["result"]["status"], "success");
    assert_eq!(status["result"]["rowCount"], 2);
    let payload: Value = serde_json::from_str(lines.next().unwrap()).unwrap();
    assert_eq!(payload["grandTotals"]["totals"]["amount"], json!(5.0));
}

#[test]
fn test_aggregator_binary_rejects_unknown_method() {
    let mut child = Command::new(AGGREGATOR)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    {
        let mut stdin = child.stdin.take().unwrap();
        writeln!(stdin, r#"{{"jsonrpc":"2.0","method":"sankey","params":{{"config":{{}}}}}}"#)
            .unwrap();
    }
    let output = child.wait_with_output().unwrap();
    assert_eq!(output.status.code(), Some(1));

    let stdout = String::from_utf8(output.stdout).unwrap();
    let status: Value = serde_json::from_str(stdout.lines().next().unwrap()).unwrap();
    assert_eq!(status["error"]["code"], -32601);
    assert!(!String::from_utf8_lossy(&output.stderr).is_empty());
}
