use std::collections::BTreeMap;

use framewatch_protocol::FrameRecord;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aspect::calculate_display_aspect_ratio;
use crate::gop::{are_all_gops_identical, identify_gops};
use crate::metrics::{calculate_bitrate, calculate_fps, calculate_gop_duration, MetricSummary};
use crate::AnalysisError;

/// Encoder characteristics derived from complete GOPs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderStatsPayload {
    /// kbps
    pub bitrate: MetricSummary,
    pub fps: MetricSummary,
    /// seconds
    pub gop_duration: MetricSummary,
    pub display_aspect_ratio: String,
    pub width: u32,
    pub height: u32,
    pub has_audio_stream: bool,
    pub are_all_gops_identical: bool,
    pub gop_count: usize,
}

/// Encoder stats plus the video frames of the still-open GOP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderStats {
    pub payload: EncoderStatsPayload,
    /// Prepend these to the next batch
    pub remained_frames: Vec<FrameRecord>,
}

/// Throughput of one media type over a wall-clock window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStreamStats {
    pub frames: usize,
    pub frame_rate: f64,
    /// kbps
    pub bitrate: f64,
}

/// Characterize the encoder from a batch of frames.
///
/// At least one complete GOP is required.
pub fn encoder_stats(frames: &[FrameRecord]) -> Result<EncoderStats, AnalysisError> {
    let has_audio_stream = frames.iter().any(FrameRecord::is_audio);
    let video: Vec<FrameRecord> = frames.iter().filter(|f| f.is_video()).cloned().collect();

    let segmentation = identify_gops(&video)?;
    let gops = segmentation.gops;
    if gops.is_empty() {
        return Err(AnalysisError::NoGops);
    }

    let bitrate = calculate_bitrate(&gops)?;
    let fps = calculate_fps(&gops)?;
    let gop_duration = calculate_gop_duration(&gops)?;

    let first = &gops[0].frames[0];
    let width = dimension(first, "width")?;
    let height = dimension(first, "height")?;
    let display_aspect_ratio = calculate_display_aspect_ratio(width, height)?;
    if width > u32::MAX as f64 || height > u32::MAX as f64 {
        return Err(AnalysisError::InvalidDimensions { width, height });
    }

    debug!(
        gops = gops.len(),
        remainder = segmentation.remainder.len(),
        bitrate_mean = bitrate.mean,
        "Computed encoder stats"
    );

    Ok(EncoderStats {
        payload: EncoderStatsPayload {
            bitrate,
            fps,
            gop_duration,
            display_aspect_ratio,
            width: width as u32,
            height: height as u32,
            has_audio_stream,
            are_all_gops_identical: are_all_gops_identical(&gops),
            gop_count: gops.len(),
        },
        remained_frames: segmentation.remainder,
    })
}

/// Per media type frame rate and bitrate over a fixed sampling window.
pub fn network_stats(
    frames: &[FrameRecord],
    duration_ms: f64,
) -> Result<BTreeMap<String, NetworkStreamStats>, AnalysisError> {
    if !(duration_ms.is_finite() && duration_ms > 0.0) {
        return Err(AnalysisError::InvalidDuration(duration_ms));
    }
    let seconds = duration_ms / 1000.0;

    let mut totals: BTreeMap<String, (usize, f64)> = BTreeMap::new();
    for (index, frame) in frames.iter().enumerate() {
        let size = frame
            .numeric("pkt_size")
            .ok_or_else(|| AnalysisError::InvalidFrame {
                index,
                field: "pkt_size",
                value: frame
                    .get("pkt_size")
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "missing".to_string()),
            })?;
        let media_type = frame.media_type().unwrap_or("unknown").to_string();
        let entry = totals.entry(media_type).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += size;
    }

    Ok(totals
        .into_iter()
        .map(|(media_type, (count, bytes))| {
            (
                media_type,
                NetworkStreamStats {
                    frames: count,
                    frame_rate: count as f64 / seconds,
                    bitrate: bytes * 8.0 / 1024.0 / seconds,
                },
            )
        })
        .collect())
}

fn dimension(frame: &FrameRecord, field: &'static str) -> Result<f64, AnalysisError> {
    frame
        .numeric(field)
        .ok_or_else(|| AnalysisError::InvalidGopFrame {
            gop: 0,
            frame: 0,
            field,
            value: frame
                .get(field)
                .map(ToString::to_string)
                .unwrap_or_else(|| "missing".to_string()),
        })
}
