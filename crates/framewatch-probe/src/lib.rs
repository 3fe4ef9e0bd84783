mod config;
mod diagnostics;
mod error;
mod events;
mod outcome;
mod stream_info;
mod supervisor;

pub use config::{is_valid_log_level, LogLevel, MonitorConfig, MonitorOptions};
pub use diagnostics::{Diagnostic, DiagnosticRing, STDERR_RING_CAPACITY};
pub use error::{ConfigError, MonitorError, ProbeError, StreamKind};
pub use events::{MonitorEvent, MonitorEvents};
pub use outcome::{ExitOutcome, ProcessExit};
pub use stream_info::{FfprobeClient, StreamInfo, StreamProbe, StreamRecord};
pub use supervisor::{build_args, ProbeMonitor, FRAME_ENTRIES};
