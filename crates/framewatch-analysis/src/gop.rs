use framewatch_protocol::{FieldValue, FrameRecord};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::AnalysisError;

/// A closed group of pictures: a key frame and everything up to the next one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gop {
    pub frames: Vec<FrameRecord>,
    /// Timestamp of the opening key frame
    pub start_time: f64,
    /// Timestamp of the key frame that closed this GOP
    pub end_time: f64,
}

impl Gop {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// `(key_frame, pict_type)` per frame, in order
    pub fn signature(&self) -> Vec<(Option<&FieldValue>, Option<&FieldValue>)> {
        self.frames
            .iter()
            .map(|f| (f.get("key_frame"), f.get("pict_type")))
            .collect()
    }
}

/// Result of segmenting a frame sequence.
///
/// `remainder` holds the GOP still open at the end of the input. Feed it back
/// in front of the next batch so the boundary can be completed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GopSegmentation {
    pub gops: Vec<Gop>,
    pub remainder: Vec<FrameRecord>,
}

/// Split frames into complete GOPs plus the open tail.
///
/// Frames before the first key frame are discarded.
pub fn identify_gops(frames: &[FrameRecord]) -> Result<GopSegmentation, AnalysisError> {
    let mut gops = Vec::new();
    let mut open: Vec<FrameRecord> = Vec::new();
    let mut open_start = 0.0;
    let mut discarded = 0usize;

    for (index, frame) in frames.iter().enumerate() {
        if frame.is_key_frame() {
            let timestamp = key_frame_timestamp(index, frame)?;
            if !open.is_empty() {
                gops.push(Gop {
                    frames: std::mem::take(&mut open),
                    start_time: open_start,
                    end_time: timestamp,
                });
            }
            open_start = timestamp;
            open.push(frame.clone());
        } else if open.is_empty() {
            discarded += 1;
        } else {
            open.push(frame.clone());
        }
    }

    trace!(
        gops = gops.len(),
        remainder = open.len(),
        discarded,
        "Segmented frames"
    );

    Ok(GopSegmentation {
        gops,
        remainder: open,
    })
}

/// True when every GOP has the same frame-type pattern as the first one.
pub fn are_all_gops_identical(gops: &[Gop]) -> bool {
    let Some(first) = gops.first() else {
        return true;
    };
    let reference = first.signature();
    gops[1..].iter().all(|gop| gop.signature() == reference)
}

fn key_frame_timestamp(index: usize, frame: &FrameRecord) -> Result<f64, AnalysisError> {
    frame
        .numeric("pkt_pts_time")
        .ok_or_else(|| AnalysisError::InvalidFrame {
            index,
            field: "pkt_pts_time",
            value: frame
                .get("pkt_pts_time")
                .map(ToString::to_string)
                .unwrap_or_else(|| "missing".to_string()),
        })
}
