use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The final outcome of a monitoring run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The probe reached the end of the stream
    Completed {
        samples: usize,
        restarts: u32,
        total_duration_secs: f64,
    },
    /// User requested stop (e.g., Ctrl+C)
    Interrupted {
        samples: usize,
        restarts: u32,
        total_duration_secs: f64,
    },
    /// The probe could not be kept running
    Failed {
        samples: usize,
        restarts: u32,
        error: String,
        total_duration_secs: f64,
    },
}

impl RunOutcome {
    pub fn completed(samples: usize, restarts: u32, duration: Duration) -> Self {
        Self::Completed {
            samples,
            restarts,
            total_duration_secs: duration.as_secs_f64(),
        }
    }

    pub fn interrupted(samples: usize, restarts: u32, duration: Duration) -> Self {
        Self::Interrupted {
            samples,
            restarts,
            total_duration_secs: duration.as_secs_f64(),
        }
    }

    pub fn failed(samples: usize, restarts: u32, error: String, duration: Duration) -> Self {
        Self::Failed {
            samples,
            restarts,
            error,
            total_duration_secs: duration.as_secs_f64(),
        }
    }

    pub fn samples(&self) -> usize {
        match self {
            Self::Completed { samples, .. } => *samples,
            Self::Interrupted { samples, .. } => *samples,
            Self::Failed { samples, .. } => *samples,
        }
    }

    pub fn restarts(&self) -> u32 {
        match self {
            Self::Completed { restarts, .. } => *restarts,
            Self::Interrupted { restarts, .. } => *restarts,
            Self::Failed { restarts, .. } => *restarts,
        }
    }

    pub fn total_duration_secs(&self) -> f64 {
        match self {
            Self::Completed {
                total_duration_secs,
                ..
            }
            | Self::Interrupted {
                total_duration_secs,
                ..
            }
            | Self::Failed {
                total_duration_secs,
                ..
            } => *total_duration_secs,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed { .. } => 0,
            Self::Interrupted { .. } => 130,
            Self::Failed { .. } => 2,
        }
    }
}
