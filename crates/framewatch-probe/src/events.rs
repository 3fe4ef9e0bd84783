use framewatch_protocol::FrameRecord;
use tokio::sync::mpsc;

use crate::{Diagnostic, ExitOutcome, MonitorError};

/// Everything a monitor session reports, in the order it happened.
///
/// `Frame`, `Stderr` and `Error` are non-fatal. `Exit` is terminal for the
/// session and is sent exactly once per session.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    Frame(FrameRecord),
    Stderr(Diagnostic),
    Error(MonitorError),
    Exit(ExitOutcome),
}

impl MonitorEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MonitorEvent::Exit(_))
    }
}

/// Receiving side of a monitor's event channel
pub type MonitorEvents = mpsc::UnboundedReceiver<MonitorEvent>;
