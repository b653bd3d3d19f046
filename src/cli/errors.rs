//! Errors surfaced by the `aeroquery` binary. Each carries a stable code
//! printed ahead of the message and maps to a process exit status.

use std::io;

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Config file missing, unreadable or invalid
    ConfigError,
    IoError,
    /// Metadata, seed store or listener could not be brought up
    BootFailed,
    /// `compile` was given a filter or document it cannot use
    CompileError,
}

impl CliErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "AQ_CLI_CONFIG_ERROR",
            Self::IoError => "AQ_CLI_IO_ERROR",
            Self::BootFailed => "AQ_CLI_BOOT_FAILED",
            Self::CompileError => "AQ_CLI_COMPILE_ERROR",
        }
    }

    /// Usage-type problems exit 2, runtime failures exit 1
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigError | Self::CompileError => 2,
            Self::IoError | Self::BootFailed => 1,
        }
    }
}

#[derive(Debug, Error)]
#[error("{}: {message}", code.code())]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn boot_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::BootFailed, msg)
    }

    pub fn compile_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::CompileError, msg)
    }

    pub fn code(&self) -> CliErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(e.to_string())
    }
}

pub type CliResult<T> = Result<T, CliError>;
