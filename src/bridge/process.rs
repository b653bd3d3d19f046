//! # Aggregation Process
//!
//! One request-scoped aggregator subprocess. The caller sends the init
//! envelope, streams records into stdin and collects the payload. Every
//! failure path kills the process before the error is returned, and the
//! child is also killed when the handle is dropped.
//!
//! Writes go through a `BufWriter` sized to the high-water mark in front of
//! the stdin pipe, so at most that many bytes sit unwritten in this process.
//! When the pipe is full the write suspends and the upstream stream is not
//! polled until it drains.

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::pin_mut;
use futures_util::stream::{Stream, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use super::errors::{BridgeError, BridgeResult};
use super::protocol::{parse_svg_payload, parse_table_payload, split_output, AggregationMethod, RpcRequest};
use crate::pipeline::StreamError;
use crate::record::Record;

/// Binary name of the bundled aggregator
pub const AGGREGATOR_BINARY: &str = "aeroquery-aggregator";

/// How long to wait for stderr to drain after exit
const STDERR_DRAIN: Duration = Duration::from_millis(250);

/// Process and buffer limits
#[derive(Debug, Clone)]
pub struct ProcessSettings {
    pub program: String,
    pub args: Vec<String>,
    /// Bytes buffered in front of stdin before a write waits on the pipe
    pub stdin_high_water_mark: usize,
    pub max_output_bytes: usize,
    /// Bytes of stderr kept for error messages
    pub stderr_limit_bytes: usize,
    pub kill_timeout: Duration,
    /// Budget for output and exit once stdin is closed
    pub exit_timeout: Duration,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            program: default_aggregator_program(),
            args: Vec::new(),
            stdin_high_water_mark: 16 * 1024,
            max_output_bytes: 64 * 1024 * 1024,
            stderr_limit_bytes: 64 * 1024,
            kill_timeout: Duration::from_millis(250),
            exit_timeout: Duration::from_secs(120),
        }
    }
}

impl ProcessSettings {
    pub fn with_command(mut self, program: impl Into<String>, args: Vec<String>) -> Self {
        self.program = program.into();
        self.args = args;
        self
    }

    pub fn with_exit_timeout(mut self, exit_timeout: Duration) -> Self {
        self.exit_timeout = exit_timeout;
        self
    }

    /// `sh -c <script>`
    pub fn shell(script: impl Into<String>) -> Self {
        Self::default().with_command("sh", vec!["-c".to_string(), script.into()])
    }
}

/// The aggregator next to the running executable, else whatever is on `PATH`
pub fn default_aggregator_program() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(AGGREGATOR_BINARY)))
        .filter(|path| path.exists())
        .map(|path| path.to_string_lossy().into_owned())
        .unwrap_or_else(|| AGGREGATOR_BINARY.to_string())
}

/// A spawned aggregator
pub struct AggregationProcess {
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    stdout_task: Option<JoinHandle<Result<Vec<u8>, String>>>,
    stderr_task: Option<JoinHandle<()>>,
    stderr: Arc<Mutex<String>>,
    settings: ProcessSettings,
    terminated: bool,
    kill_attempts: u32,
    records_sent: u64,
}

impl AggregationProcess {
    /// Spawns the aggregator with all three pipes attached
    pub fn spawn(settings: ProcessSettings) -> BridgeResult<Self> {
        let mut child = Command::new(&settings.program)
            .args(&settings.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BridgeError::Spawn {
                program: settings.program.clone(),
                message: e.to_string(),
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or(BridgeError::PipeUnavailable("stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(BridgeError::PipeUnavailable("stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or(BridgeError::PipeUnavailable("stderr"))?;

        // Read stdout while stdin is still being written so neither side stalls
        let read_limit = settings.max_output_bytes as u64 + 1;
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            stdout
                .take(read_limit)
                .read_to_end(&mut buf)
                .await
                .map(|_| buf)
                .map_err(|e| e.to_string())
        });

        let captured = Arc::new(Mutex::new(String::new()));
        let sink = captured.clone();
        let stderr_limit = settings.stderr_limit_bytes;
        let pid = child.id();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(pid = ?pid, line = %line, "aggregator stderr");
                if let Ok(mut buf) = sink.lock() {
                    if buf.len() + line.len() < stderr_limit {
                        buf.push_str(&line);
                        buf.push('\n');
                    }
                }
            }
        });

        info!(pid = ?pid, program = %settings.program, "aggregation process spawned");

        Ok(Self {
            child,
            stdin: Some(BufWriter::with_capacity(settings.stdin_high_water_mark, stdin)),
            stdout_task: Some(stdout_task),
            stderr_task: Some(stderr_task),
            stderr: captured,
            settings,
            terminated: false,
            kill_attempts: 0,
            records_sent: 0,
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Kill signals sent so far
    pub fn kill_attempts(&self) -> u32 {
        self.kill_attempts
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn records_sent(&self) -> u64 {
        self.records_sent
    }

    /// Stderr captured so far
    pub fn stderr_output(&self) -> String {
        match self.stderr.lock() {
            Ok(buf) => buf.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Writes the init envelope; resolves once the pipe has taken it
    pub async fn send_rpc_request(
        &mut self,
        method: AggregationMethod,
        config: serde_json::Value,
    ) -> BridgeResult<()> {
        let line = match RpcRequest::new(method, config).to_line() {
            Ok(line) => line,
            Err(err) => return Err(self.fail(err).await),
        };
        let written = match self.stdin.as_mut() {
            Some(stdin) => match stdin.write_all(line.as_bytes()).await {
                Ok(()) => stdin.flush().await,
                Err(e) => Err(e),
            },
            None => return Err(self.fail(BridgeError::PipeUnavailable("stdin")).await),
        };
        if let Err(e) = written {
            return Err(self.fail(write_error(e)).await);
        }
        debug!(pid = ?self.id(), method = method.as_str(), "RPC request sent");
        Ok(())
    }

    /// Writes every record as one JSON line, then closes stdin
    pub async fn stream_records<S>(&mut self, records: S) -> BridgeResult<u64>
    where
        S: Stream<Item = Result<Record, StreamError>>,
    {
        pin_mut!(records);
        while let Some(item) = records.next().await {
            let record = match item {
                Ok(record) => record,
                Err(err) => return Err(self.fail(BridgeError::Upstream(err.to_string())).await),
            };
            let mut line = match serde_json::to_vec(&record) {
                Ok(line) => line,
                Err(e) => return Err(self.fail(BridgeError::Upstream(e.to_string())).await),
            };
            line.push(b'\n');

            let written = match self.stdin.as_mut() {
                Some(stdin) => stdin.write_all(&line).await,
                None => return Err(self.fail(BridgeError::PipeUnavailable("stdin")).await),
            };
            if let Err(e) = written {
                return Err(self.fail(write_error(e)).await);
            }
            self.records_sent += 1;
        }

        if let Err(err) = self.close_stdin().await {
            return Err(self.fail(err).await);
        }
        debug!(pid = ?self.id(), records = self.records_sent, "records streamed");
        Ok(self.records_sent)
    }

    /// Collects a JSON payload
    pub async fn collect_result(&mut self) -> BridgeResult<serde_json::Value> {
        let output = self.collect_output().await?;
        let parsed = split_output(&output).and_then(|(_, payload)| parse_table_payload(payload));
        match parsed {
            Ok(value) => Ok(value),
            Err(err) => Err(self.fail(err).await),
        }
    }

    /// Collects an SVG payload
    pub async fn collect_svg(&mut self) -> BridgeResult<String> {
        let output = self.collect_output().await?;
        let parsed = split_output(&output).and_then(|(_, payload)| parse_svg_payload(payload));
        match parsed {
            Ok(svg) => Ok(svg),
            Err(err) => Err(self.fail(err).await),
        }
    }

    /// Kills the process unless it already ended or was already killed
    pub async fn kill(&mut self) {
        self.stdin = None;
        if self.terminated {
            return;
        }
        self.terminated = true;

        if let Ok(Some(status)) = self.child.try_wait() {
            debug!(pid = ?self.id(), %status, "aggregation process already exited");
            return;
        }

        self.kill_attempts += 1;
        let pid = self.id();
        if let Err(e) = self.child.start_kill() {
            warn!(pid = ?pid, error = %e, "failed to kill aggregation process");
            return;
        }
        match timeout(self.settings.kill_timeout, self.child.wait()).await {
            Ok(_) => debug!(pid = ?pid, "aggregation process killed"),
            Err(_) => warn!(pid = ?pid, "aggregation process did not exit after kill"),
        }
    }

    async fn close_stdin(&mut self) -> BridgeResult<()> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.flush().await.map_err(write_error)?;
            stdin.shutdown().await.map_err(write_error)?;
        }
        Ok(())
    }

    async fn collect_output(&mut self) -> BridgeResult<String> {
        if let Err(err) = self.close_stdin().await {
            return Err(self.fail(err).await);
        }

        let deadline = Instant::now() + self.settings.exit_timeout;
        let bytes = match self.stdout_task.take() {
            Some(task) => match timeout_at(deadline, task).await {
                Ok(Ok(Ok(bytes))) => bytes,
                Ok(Ok(Err(message))) => {
                    return Err(self
                        .fail(BridgeError::protocol(format!("failed to read output: {}", message)))
                        .await)
                }
                Ok(Err(join)) => {
                    return Err(self
                        .fail(BridgeError::protocol(format!("output reader failed: {}", join)))
                        .await)
                }
                Err(_) => {
                    let err = self.exit_timeout_error();
                    return Err(self.fail(err).await);
                }
            },
            None => return Err(self.fail(BridgeError::PipeUnavailable("stdout")).await),
        };
        if bytes.len() > self.settings.max_output_bytes {
            return Err(self.fail(BridgeError::OutputTooLarge(self.settings.max_output_bytes)).await);
        }

        let status = match timeout_at(deadline, self.child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                return Err(self
                    .fail(BridgeError::Exit {
                        status: e.to_string(),
                        stderr: String::new(),
                    })
                    .await)
            }
            Err(_) => {
                warn!(pid = ?self.id(), "aggregation process still running after output closed");
                let err = self.exit_timeout_error();
                return Err(self.fail(err).await);
            }
        };
        self.terminated = true;
        self.drain_stderr().await;

        if !status.success() {
            // A failure envelope on stdout explains the exit better than the status
            if let Err(rpc @ BridgeError::Rpc { .. }) = split_output(&String::from_utf8_lossy(&bytes)) {
                return Err(rpc.with_stderr(&self.stderr_output()));
            }
            return Err(BridgeError::Exit {
                status: status.to_string(),
                stderr: String::new(),
            }
            .with_stderr(&self.stderr_output()));
        }

        String::from_utf8(bytes).map_err(|e| {
            BridgeError::protocol(format!("output is not UTF-8: {}", e))
                .with_stderr(&self.stderr_output())
        })
    }

    fn exit_timeout_error(&self) -> BridgeError {
        BridgeError::Timeout {
            timeout_ms: self.settings.exit_timeout.as_millis() as u64,
            stderr: String::new(),
        }
    }

    /// Kills the process and attaches captured stderr to the error
    async fn fail(&mut self, err: BridgeError) -> BridgeError {
        self.kill().await;
        self.drain_stderr().await;
        err.with_stderr(&self.stderr_output())
    }

    async fn drain_stderr(&mut self) {
        if let Some(task) = self.stderr_task.take() {
            let _ = timeout(STDERR_DRAIN, task).await;
        }
    }
}

impl Drop for AggregationProcess {
    fn drop(&mut self) {
        if let Some(task) = self.stdout_task.take() {
            task.abort();
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

fn write_error(e: std::io::Error) -> BridgeError {
    BridgeError::Write {
        message: e.to_string(),
        stderr: String::new(),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use futures_util::stream;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const OK_SCRIPT: &str = r#"read init; n=0; while read line; do n=$((n+1)); done; echo "{\"jsonrpc\":\"2.0\",\"result\":{\"status\":\"success\",\"rowCount\":$n}}"; echo "{\"count\":$n}""#;

    fn rec(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_full_session() {
        let mut process = AggregationProcess::spawn(ProcessSettings::shell(OK_SCRIPT)).unwrap();
        process
            .send_rpc_request(AggregationMethod::Pivot, json!({"rows": []}))
            .await
            .unwrap();
        let records = stream::iter(vec![Ok(rec(json!({"a": 1}))), Ok(rec(json!({"a": 2})))]);
        assert_eq!(process.stream_records(records).await.unwrap(), 2);
        assert_eq!(process.collect_result().await.unwrap(), json!({"count": 2}));
        assert_eq!(process.kill_attempts(), 0);
    }

    #[tokio::test]
    async fn test_upstream_error_kills_once() {
        let mut process = AggregationProcess::spawn(ProcessSettings::shell("exec sleep 30")).unwrap();
        process
            .send_rpc_request(AggregationMethod::Graph, json!({}))
            .await
            .unwrap();
        let records = stream::iter(vec![
            Ok(rec(json!({"a": 1}))),
            Err(StreamError::Encode("cursor lost".into())),
        ]);
        let err = process.stream_records(records).await.unwrap_err();
        assert!(matches!(err, BridgeError::Upstream(_)));
        assert_eq!(process.kill_attempts(), 1);

        process.kill().await;
        assert_eq!(process.kill_attempts(), 1);
        assert!(process.collect_result().await.is_err());
        assert_eq!(process.kill_attempts(), 1);
    }

    #[tokio::test]
    async fn test_exit_code_and_stderr() {
        let script = "cat > /dev/null; echo 'bad config' >&2; exit 3";
        let mut process = AggregationProcess::spawn(ProcessSettings::shell(script)).unwrap();
        process
            .send_rpc_request(AggregationMethod::Pivot, json!({}))
            .await
            .unwrap();
        process.stream_records(stream::empty()).await.unwrap();
        let err = process.collect_result().await.unwrap_err();
        match &err {
            BridgeError::Exit { stderr, .. } => assert!(stderr.contains("bad config")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(err.to_string().contains("bad config"));
        assert_eq!(process.kill_attempts(), 0);
    }

    #[tokio::test]
    async fn test_rpc_error_envelope() {
        let script = r#"cat > /dev/null; echo '{"jsonrpc":"2.0","error":{"code":-32602,"message":"rows required"}}'"#;
        let mut process = AggregationProcess::spawn(ProcessSettings::shell(script)).unwrap();
        process.stream_records(stream::empty()).await.unwrap();
        let err = process.collect_result().await.unwrap_err();
        assert!(matches!(err, BridgeError::Rpc { code: -32602, .. }));
    }

    #[tokio::test]
    async fn test_lingering_process_times_out_and_is_killed() {
        // Closes stdout without exiting
        let script = "cat > /dev/null; echo 'still busy' >&2; exec 1>&-; exec sleep 30";
        let settings = ProcessSettings::shell(script).with_exit_timeout(Duration::from_millis(300));
        let mut process = AggregationProcess::spawn(settings).unwrap();
        process.stream_records(stream::empty()).await.unwrap();

        let outcome = timeout(Duration::from_secs(5), process.collect_result()).await;
        let err = outcome.expect("collect must not wait on the child forever").unwrap_err();
        match &err {
            BridgeError::Timeout { timeout_ms, stderr } => {
                assert_eq!(*timeout_ms, 300);
                assert!(stderr.contains("still busy"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(process.kill_attempts(), 1);
        assert!(process.is_terminated());
    }

    #[tokio::test]
    async fn test_silent_open_stdout_times_out() {
        let settings = ProcessSettings::shell("cat > /dev/null; exec sleep 30")
            .with_exit_timeout(Duration::from_millis(300));
        let mut process = AggregationProcess::spawn(settings).unwrap();
        process.stream_records(stream::empty()).await.unwrap();

        let err = timeout(Duration::from_secs(5), process.collect_svg())
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { .. }));
        assert_eq!(process.kill_attempts(), 1);
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let settings = ProcessSettings::default().with_command("/nonexistent/aggregator", vec![]);
        assert!(matches!(
            AggregationProcess::spawn(settings),
            Err(BridgeError::Spawn { .. })
        ));
    }

    #[tokio::test]
    async fn test_writes_wait_on_a_full_pipe() {
        let mut process = AggregationProcess::spawn(ProcessSettings::shell("exec sleep 30")).unwrap();
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let padding = "x".repeat(100);
        let records = stream::iter(0..100_000).map(move |i| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(rec(json!({"i": i, "pad": padding})))
        });

        let outcome = timeout(Duration::from_millis(500), process.stream_records(records)).await;
        assert!(outcome.is_err(), "writes should block once the pipe is full");
        // Pipe buffer plus the high-water mark, far below the whole input
        assert!(pulled.load(Ordering::SeqCst) < 10_000);

        process.kill().await;
        assert_eq!(process.kill_attempts(), 1);
    }
}
