use framewatch_probe::MonitorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Monitor error: {0}")]
    Monitor(#[from] MonitorError),

    #[error("Monitor event channel closed unexpectedly")]
    EventsClosed,
}
