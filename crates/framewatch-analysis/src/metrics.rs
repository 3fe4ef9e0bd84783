use serde::{Deserialize, Serialize};

use crate::{AnalysisError, Gop};

/// Aggregate of a per-GOP metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl MetricSummary {
    fn from_values(values: &[f64]) -> Result<Self, AnalysisError> {
        if values.is_empty() {
            return Err(AnalysisError::NoGops);
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        Ok(Self { min, max, mean })
    }
}

/// Bitrate of one GOP in kbps
pub fn gop_bitrate(gop: &Gop) -> Result<f64, AnalysisError> {
    bitrate_at(0, gop)
}

/// Frames per second within one GOP
pub fn gop_fps(gop: &Gop) -> Result<f64, AnalysisError> {
    fps_at(0, gop)
}

/// Duration of one GOP in seconds
pub fn gop_duration(gop: &Gop) -> Result<f64, AnalysisError> {
    duration_at(0, gop)
}

pub fn calculate_bitrate(gops: &[Gop]) -> Result<MetricSummary, AnalysisError> {
    summarize(gops, bitrate_at)
}

pub fn calculate_fps(gops: &[Gop]) -> Result<MetricSummary, AnalysisError> {
    summarize(gops, fps_at)
}

pub fn calculate_gop_duration(gops: &[Gop]) -> Result<MetricSummary, AnalysisError> {
    summarize(gops, duration_at)
}

fn summarize(
    gops: &[Gop],
    metric: fn(usize, &Gop) -> Result<f64, AnalysisError>,
) -> Result<MetricSummary, AnalysisError> {
    let values = gops
        .iter()
        .enumerate()
        .map(|(index, gop)| metric(index, gop))
        .collect::<Result<Vec<_>, _>>()?;
    MetricSummary::from_values(&values)
}

fn duration_at(index: usize, gop: &Gop) -> Result<f64, AnalysisError> {
    let duration = gop.duration();
    // NaN fails this check too
    if duration > 0.0 {
        Ok(duration)
    } else {
        Err(AnalysisError::InvalidGop {
            index,
            start_time: gop.start_time,
            end_time: gop.end_time,
        })
    }
}

fn fps_at(index: usize, gop: &Gop) -> Result<f64, AnalysisError> {
    let duration = duration_at(index, gop)?;
    Ok(gop.frame_count() as f64 / duration)
}

fn bitrate_at(index: usize, gop: &Gop) -> Result<f64, AnalysisError> {
    let duration = duration_at(index, gop)?;
    let mut total_bytes = 0.0;
    for (frame_index, frame) in gop.frames.iter().enumerate() {
        total_bytes += frame
            .numeric("pkt_size")
            .ok_or_else(|| AnalysisError::InvalidGopFrame {
                gop: index,
                frame: frame_index,
                field: "pkt_size",
                value: frame
                    .get("pkt_size")
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "missing".to_string()),
            })?;
    }
    Ok(total_bytes / duration * 8.0 / 1024.0)
}
