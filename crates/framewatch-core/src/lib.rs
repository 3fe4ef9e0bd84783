mod context;
mod error;
mod outcome;
mod runner;

pub use context::{StatsSample, StatsWindow};
pub use error::RunError;
pub use outcome::RunOutcome;
pub use runner::{MonitorRunner, RunnerSettings};
