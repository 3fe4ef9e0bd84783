use thiserror::Error;

/// Data-validity failures raised by the analysis functions
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Frame {index} has invalid {field}: {value}")]
    InvalidFrame {
        index: usize,
        field: &'static str,
        value: String,
    },

    #[error("GOP {index} has non-positive duration (start {start_time}, end {end_time})")]
    InvalidGop {
        index: usize,
        start_time: f64,
        end_time: f64,
    },

    #[error("GOP {gop} frame {frame} has invalid {field}: {value}")]
    InvalidGopFrame {
        gop: usize,
        frame: usize,
        field: &'static str,
        value: String,
    },

    #[error("No complete GOP found")]
    NoGops,

    #[error("Invalid dimensions {width}x{height}: width and height must be positive integers")]
    InvalidDimensions { width: f64, height: f64 },

    #[error("Invalid sampling duration: {0}ms")]
    InvalidDuration(f64),
}
