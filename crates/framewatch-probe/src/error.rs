use std::path::PathBuf;
use std::time::Duration;

use framewatch_protocol::DecodeError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which output pipe of the probe a fault came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Stdout => write!(f, "stdout"),
            StreamKind::Stderr => write!(f, "stderr"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid probe path: {0:?}")]
    InvalidProbePath(PathBuf),

    #[error("{field} must be a positive integer")]
    NotPositive { field: &'static str },

    #[error("{field} must be at most {max}")]
    TooLarge { field: &'static str, max: u64 },

    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),
}

/// Errors raised or emitted by a [`crate::ProbeMonitor`]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Monitor is already listening")]
    AlreadyListening,

    #[error("Monitor is already stopped")]
    AlreadyStopped,

    #[error("Invalid probe invocation: {0}")]
    InvalidArgument(String),

    #[error("Failed to start probe process: {0}")]
    StartFailed(String),

    #[error("Probe process error: {0}")]
    Process(String),

    #[error("Probe {stream} error: {message}")]
    Stream { stream: StreamKind, message: String },

    #[error("Frame decoding failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("Failed to stop probe process: {0}")]
    StopFailed(String),
}

impl MonitorError {
    /// Stable tag for logs and serialized outcomes
    pub fn kind(&self) -> &'static str {
        match self {
            MonitorError::Config(_) => "config",
            MonitorError::AlreadyListening => "already_listening",
            MonitorError::AlreadyStopped => "already_stopped",
            MonitorError::InvalidArgument(_) => "invalid_argument",
            MonitorError::StartFailed(_) => "start_failed",
            MonitorError::Process(_) => "process",
            MonitorError::Stream { .. } => "stream",
            MonitorError::Decode(DecodeError::BufferOverflow { .. }) => "buffer_overflow",
            MonitorError::Decode(DecodeError::MalformedRecord { .. }) => "malformed_record",
            MonitorError::StopFailed(_) => "stop_failed",
        }
    }
}

/// Errors from a one-shot stream probe
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Failed to spawn probe process: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("Probe exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("Failed to parse probe output: {0}")]
    Parse(#[from] serde_json::Error),
}
