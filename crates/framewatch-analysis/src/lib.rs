pub mod aspect;
pub mod error;
pub mod gop;
pub mod metrics;
pub mod stats;

pub use aspect::{calculate_display_aspect_ratio, AspectRatioTable, NamedAspectRatio};
pub use error::AnalysisError;
pub use gop::{are_all_gops_identical, identify_gops, Gop, GopSegmentation};
pub use metrics::{
    calculate_bitrate, calculate_fps, calculate_gop_duration, gop_bitrate, gop_duration, gop_fps,
    MetricSummary,
};
pub use stats::{
    encoder_stats, network_stats, EncoderStats, EncoderStatsPayload, NetworkStreamStats,
};
