//! Bridge error types

use thiserror::Error;

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    // ==================
    // Process lifecycle
    // ==================
    #[error("Failed to spawn aggregation process [{program}]: {message}")]
    Spawn { program: String, message: String },

    #[error("Aggregation process {0} is not available")]
    PipeUnavailable(&'static str),

    #[error("Aggregation process exited with {status}{}", stderr_suffix(.stderr))]
    Exit { status: String, stderr: String },

    /// Output or exit did not arrive within the exit timeout after stdin closed
    #[error("Aggregation process did not finish within {timeout_ms}ms{}", stderr_suffix(.stderr))]
    Timeout { timeout_ms: u64, stderr: String },

    // ==================
    // Data transfer
    // ==================
    #[error("Failed to write to aggregation process: {message}{}", stderr_suffix(.stderr))]
    Write { message: String, stderr: String },

    #[error("Record stream failed: {0}")]
    Upstream(String),

    #[error("Aggregation output exceeds {0} bytes")]
    OutputTooLarge(usize),

    // ==================
    // Protocol
    // ==================
    #[error("RPC error {code}: {message}{}", stderr_suffix(.stderr))]
    Rpc {
        code: i64,
        message: String,
        stderr: String,
    },

    #[error("Malformed aggregation output: {reason}{}", stderr_suffix(.stderr))]
    Protocol { reason: String, stderr: String },
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(" (stderr: {})", trimmed)
    }
}

impl BridgeError {
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
            stderr: String::new(),
        }
    }

    /// Attaches captured diagnostics where the variant carries them
    pub fn with_stderr(mut self, captured: &str) -> Self {
        match &mut self {
            Self::Exit { stderr, .. }
            | Self::Timeout { stderr, .. }
            | Self::Write { stderr, .. }
            | Self::Rpc { stderr, .. }
            | Self::Protocol { stderr, .. } => {
                if stderr.is_empty() {
                    *stderr = captured.to_string();
                }
            }
            _ => {}
        }
        self
    }
}
