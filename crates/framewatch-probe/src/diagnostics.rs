use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Number of stderr diagnostics retained for abnormal exit reports
pub const STDERR_RING_CAPACITY: usize = 5;

/// One line the probe wrote to stderr
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Bounded FIFO of the most recent diagnostics; the oldest is evicted first.
#[derive(Debug, Clone)]
pub struct DiagnosticRing {
    entries: VecDeque<Diagnostic>,
    capacity: usize,
}

impl Default for DiagnosticRing {
    fn default() -> Self {
        Self::new(STDERR_RING_CAPACITY)
    }
}

impl DiagnosticRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(diagnostic);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// Retained messages joined oldest first, one per line
    pub fn joined(&self) -> String {
        self.entries
            .iter()
            .map(|d| d.message.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
