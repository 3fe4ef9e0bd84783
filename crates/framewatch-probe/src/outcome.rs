use serde::{Serialize, Serializer};
use std::process::ExitStatus;

use crate::{DiagnosticRing, MonitorError};

/// How the probe process ended
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessExit {
    pub code: Option<i32>,
    /// Name of the terminating signal, e.g. `SIGTERM`
    pub signal: Option<String>,
}

impl ProcessExit {
    pub fn new(code: Option<i32>, signal: Option<&str>) -> Self {
        Self {
            code,
            signal: signal.map(String::from),
        }
    }

    pub fn success(&self) -> bool {
        self.signal.is_none() && self.code == Some(0)
    }
}

impl From<ExitStatus> for ProcessExit {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
            signal: exit_signal(&status),
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<String> {
    use std::os::unix::process::ExitStatusExt;
    status.signal().map(signal_name)
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<String> {
    None
}

#[cfg(unix)]
fn signal_name(signal: i32) -> String {
    let name = match signal {
        libc::SIGHUP => "SIGHUP",
        libc::SIGINT => "SIGINT",
        libc::SIGQUIT => "SIGQUIT",
        libc::SIGABRT => "SIGABRT",
        libc::SIGKILL => "SIGKILL",
        libc::SIGSEGV => "SIGSEGV",
        libc::SIGPIPE => "SIGPIPE",
        libc::SIGTERM => "SIGTERM",
        other => return format!("SIG{}", other),
    };
    name.to_string()
}

/// The terminal outcome of a monitor session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ExitOutcome {
    /// The probe could not be started
    StartError {
        #[serde(serialize_with = "display")]
        error: MonitorError,
    },
    /// Terminated by a signal
    ExternalSignal { signal: String },
    /// Exited with status 0
    NormalExit { code: i32 },
    /// Exited with a failure status
    AbnormalExit {
        code: Option<i32>,
        stderr_output: String,
    },
    /// Torn down because its output could not be decoded
    ProcessingError {
        #[serde(serialize_with = "display")]
        error: MonitorError,
    },
}

impl ExitOutcome {
    /// Classify a process exit. A signal wins over the exit code.
    pub fn classify(exit: &ProcessExit, stderr: &DiagnosticRing) -> Self {
        if let Some(ref signal) = exit.signal {
            return ExitOutcome::ExternalSignal {
                signal: signal.clone(),
            };
        }
        match exit.code {
            Some(0) => ExitOutcome::NormalExit { code: 0 },
            code => ExitOutcome::AbnormalExit {
                code,
                stderr_output: stderr.joined(),
            },
        }
    }

    pub fn is_normal(&self) -> bool {
        matches!(self, ExitOutcome::NormalExit { .. })
    }

    pub fn short_description(&self) -> String {
        match self {
            ExitOutcome::StartError { error } => format!("start error: {}", error),
            ExitOutcome::ExternalSignal { signal } => format!("signal {}", signal),
            ExitOutcome::NormalExit { code } => format!("exit {}", code),
            ExitOutcome::AbnormalExit { code: Some(code), .. } => format!("exit {}", code),
            ExitOutcome::AbnormalExit { code: None, .. } => "exit unknown".to_string(),
            ExitOutcome::ProcessingError { error } => format!("processing error: {}", error),
        }
    }
}

fn display<S: Serializer>(error: &MonitorError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}
