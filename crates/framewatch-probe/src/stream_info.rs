use async_trait::async_trait;
use framewatch_analysis::calculate_display_aspect_ratio;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::{MonitorConfig, ProbeError};

/// Sample aspect ratios the probe reports when it could not determine one
const UNKNOWN_SAMPLE_ASPECT_RATIOS: [&str; 2] = ["0:1", "N/A"];

/// One stream as described by the probe's JSON output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRecord {
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub codec_type: Option<String>,
    #[serde(default)]
    pub codec_name: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub sample_aspect_ratio: Option<String>,
    #[serde(default)]
    pub display_aspect_ratio: Option<String>,
    /// Every other field the probe reported
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl StreamRecord {
    pub fn is_video(&self) -> bool {
        self.codec_type.as_deref() == Some("video")
    }

    pub fn is_audio(&self) -> bool {
        self.codec_type.as_deref() == Some("audio")
    }

    /// Replace an unknown sample aspect ratio with square pixels and derive
    /// the display ratio from the frame size.
    pub fn normalize_aspect_ratio(&mut self) {
        if !self.is_video() {
            return;
        }
        let unknown = match self.sample_aspect_ratio.as_deref() {
            None => true,
            Some(sar) => UNKNOWN_SAMPLE_ASPECT_RATIOS.contains(&sar),
        };
        if !unknown {
            return;
        }

        self.sample_aspect_ratio = Some("1:1".to_string());
        if let (Some(width), Some(height)) = (self.width, self.height) {
            if let Ok(ratio) = calculate_display_aspect_ratio(width as f64, height as f64) {
                self.display_aspect_ratio = Some(ratio);
            }
        }
    }
}

/// Streams of one input, split by kind
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamInfo {
    pub videos: Vec<StreamRecord>,
    pub audios: Vec<StreamRecord>,
}

impl StreamInfo {
    /// Build from the probe's `-show_streams` JSON document.
    pub fn from_json(json: &str) -> Result<Self, ProbeError> {
        #[derive(Deserialize)]
        struct ShowStreams {
            #[serde(default)]
            streams: Vec<StreamRecord>,
        }

        let parsed: ShowStreams = serde_json::from_str(json)?;
        let mut info = StreamInfo::default();
        for mut stream in parsed.streams {
            if stream.is_video() {
                stream.normalize_aspect_ratio();
                info.videos.push(stream);
            } else if stream.is_audio() {
                info.audios.push(stream);
            }
        }
        Ok(info)
    }
}

/// One-shot stream inspection
#[async_trait]
pub trait StreamProbe: Send + Sync {
    async fn probe(&self, url: &str) -> Result<StreamInfo, ProbeError>;
}

/// [`StreamProbe`] backed by the probe binary
#[derive(Debug, Clone)]
pub struct FfprobeClient {
    probe_path: PathBuf,
    timeout_ms: u64,
    analyze_duration_ms: Option<u64>,
}

impl FfprobeClient {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            probe_path: config.probe_path().to_path_buf(),
            timeout_ms: config.timeout_ms(),
            analyze_duration_ms: config.analyze_duration_ms(),
        }
    }

    pub fn probe_path(&self) -> &Path {
        &self.probe_path
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn args(&self, url: &str) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-rw_timeout".to_string(),
            (self.timeout_ms * 1000).to_string(),
        ];
        if let Some(analyze_ms) = self.analyze_duration_ms {
            args.push("-analyzeduration".to_string());
            args.push((analyze_ms * 1000).to_string());
        }
        args.extend(
            ["-print_format", "json", "-show_streams", url]
                .into_iter()
                .map(String::from),
        );
        args
    }
}

#[async_trait]
impl StreamProbe for FfprobeClient {
    async fn probe(&self, url: &str) -> Result<StreamInfo, ProbeError> {
        let args = self.args(url);
        debug!(probe = %self.probe_path.display(), args = ?args, "Probing streams");

        let output = Command::new(&self.probe_path)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout(), output)
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout()))??;

        if !output.status.success() {
            return Err(ProbeError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        StreamInfo::from_json(&String::from_utf8_lossy(&output.stdout))
    }
}
