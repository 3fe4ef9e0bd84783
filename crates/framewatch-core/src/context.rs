use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use framewatch_analysis::{
    encoder_stats, network_stats, AnalysisError, EncoderStatsPayload, NetworkStreamStats,
};
use framewatch_protocol::FrameRecord;
use tracing::debug;

/// Frames accumulated between two stats samples.
///
/// The network window is emptied on every sample. Frames of a GOP that has not
/// closed yet are carried into the next encoder sample.
#[derive(Debug)]
pub struct StatsWindow {
    network_frames: Vec<FrameRecord>,
    pending_frames: Vec<FrameRecord>,
    window_started: Instant,
    max_pending_frames: usize,
}

/// Result of one sampling pass
#[derive(Debug)]
pub struct StatsSample {
    pub network: Result<BTreeMap<String, NetworkStreamStats>, AnalysisError>,
    pub encoder: Result<EncoderStatsPayload, AnalysisError>,
    /// Frames carried into the next encoder sample
    pub pending_frames: usize,
}

impl StatsWindow {
    pub fn new(max_pending_frames: usize) -> Self {
        Self {
            network_frames: Vec::new(),
            pending_frames: Vec::new(),
            window_started: Instant::now(),
            max_pending_frames,
        }
    }

    pub fn push(&mut self, frame: FrameRecord) {
        self.network_frames.push(frame.clone());
        self.pending_frames.push(frame);

        if self.pending_frames.len() > self.max_pending_frames {
            let excess = self.pending_frames.len() - self.max_pending_frames;
            debug!(excess, "Dropping oldest pending frames");
            self.pending_frames.drain(..excess);
        }
    }

    pub fn network_len(&self) -> usize {
        self.network_frames.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending_frames.len()
    }

    /// Forget everything, e.g. when a new probe session starts its timestamps over.
    pub fn reset(&mut self) {
        self.network_frames.clear();
        self.pending_frames.clear();
        self.window_started = Instant::now();
    }

    /// Sample over the wall-clock time since the previous sample.
    pub fn sample(&mut self) -> StatsSample {
        let elapsed = self.window_started.elapsed();
        self.sample_over(elapsed)
    }

    pub fn sample_over(&mut self, elapsed: Duration) -> StatsSample {
        self.window_started = Instant::now();

        let frames = std::mem::take(&mut self.network_frames);
        let network = network_stats(&frames, elapsed.as_secs_f64() * 1000.0);

        let encoder = match encoder_stats(&self.pending_frames) {
            Ok(stats) => {
                self.pending_frames = stats.remained_frames;
                Ok(stats.payload)
            }
            // keep accumulating until a GOP closes
            Err(AnalysisError::NoGops) => Err(AnalysisError::NoGops),
            Err(e) => {
                self.pending_frames.clear();
                Err(e)
            }
        };

        StatsSample {
            network,
            encoder,
            pending_frames: self.pending_frames.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framewatch_protocol::FieldValue;

    fn frame(media: &str, key: bool, pts: f64) -> FrameRecord {
        FrameRecord::new()
            .with("media_type", media)
            .with("key_frame", FieldValue::coerce(if key { "1" } else { "0" }))
            .with("pict_type", if key { "I" } else { "P" })
            .with("pkt_pts_time", pts)
            .with("pkt_size", 1000.0)
            .with("width", 1920.0)
            .with("height", 1080.0)
    }

    #[test]
    fn test_pending_frames_wait_for_gop() {
        let mut window = StatsWindow::new(100);
        window.push(frame("video", true, 0.5));
        window.push(frame("video", false, 0.54));

        let sample = window.sample_over(Duration::from_secs(1));
        assert!(matches!(sample.encoder, Err(AnalysisError::NoGops)));
        assert_eq!(sample.pending_frames, 2);
        assert_eq!(window.network_len(), 0);

        window.push(frame("video", true, 1.5));
        let sample = window.sample_over(Duration::from_secs(1));
        let payload = sample.encoder.unwrap();
        assert_eq!(payload.gop_count, 1);
        assert_eq!(payload.display_aspect_ratio, "16:9");
        // the new key frame opens the next GOP
        assert_eq!(sample.pending_frames, 1);
    }

    #[test]
    fn test_network_sample_groups_media_types() {
        let mut window = StatsWindow::new(100);
        for i in 0..4 {
            window.push(frame("video", i == 0, i as f64 * 0.04));
        }
        window.push(frame("audio", true, 0.0));

        let sample = window.sample_over(Duration::from_secs(2));
        let network = sample.network.unwrap();
        assert_eq!(network["video"].frames, 4);
        assert_eq!(network["video"].frame_rate, 2.0);
        assert_eq!(network["audio"].frames, 1);
    }

    #[test]
    fn test_invalid_frames_drop_pending() {
        let mut window = StatsWindow::new(100);
        window.push(FrameRecord::new().with("media_type", "video").with("key_frame", 1.0));
        window.push(frame("video", true, 1.0));

        let sample = window.sample_over(Duration::from_secs(1));
        assert!(matches!(
            sample.encoder,
            Err(AnalysisError::InvalidFrame { .. })
        ));
        assert_eq!(window.pending_len(), 0);
    }

    #[test]
    fn test_pending_frames_are_capped() {
        let mut window = StatsWindow::new(3);
        for i in 0..5 {
            window.push(frame("video", false, i as f64));
        }
        assert_eq!(window.pending_len(), 3);
        assert_eq!(window.network_len(), 5);

        window.reset();
        assert_eq!(window.pending_len(), 0);
        assert_eq!(window.network_len(), 0);
    }
}
