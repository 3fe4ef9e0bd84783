use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Structured log events for a monitoring run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogEvent {
    MonitorStarted {
        url: String,
        probe_path: String,
    },
    /// One stderr line from the probe
    ProbeStderr {
        line: String,
    },
    /// Non-fatal fault reported by the monitor
    ProbeError {
        kind: String,
        message: String,
    },
    EncoderStats {
        gops: usize,
        bitrate_min: f64,
        bitrate_mean: f64,
        bitrate_max: f64,
        fps_mean: f64,
        gop_duration_mean: f64,
        aspect_ratio: String,
        width: u32,
        height: u32,
        has_audio: bool,
        identical_gops: bool,
    },
    NetworkStats {
        media_type: String,
        frames: usize,
        frame_rate: f64,
        bitrate_kbps: f64,
    },
    /// Not enough frames yet for a complete GOP
    StatsPending {
        frames: usize,
    },
    AnalysisFailed {
        error: String,
    },
    ProbeExited {
        outcome: String,
        detail: Option<String>,
    },
    ProbeRestarting {
        attempt: u32,
        max_restarts: u32,
        delay_secs: f64,
    },
    MonitorStopped {
        samples: usize,
        restarts: u32,
        duration_secs: f64,
    },
}

impl LogEvent {
    /// Add a timestamp to serialize with the event
    fn with_timestamp(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "timestamp".to_string(),
                serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }
        value
    }

    fn compact_line(&self) -> String {
        match self {
            LogEvent::MonitorStarted { url, .. } => format!("monitor:start {}", url),
            LogEvent::ProbeStderr { line } => format!("probe:stderr {}", line),
            LogEvent::ProbeError { kind, message } => format!("probe:error:{} {}", kind, message),
            LogEvent::EncoderStats {
                gops,
                bitrate_mean,
                fps_mean,
                gop_duration_mean,
                aspect_ratio,
                width,
                height,
                ..
            } => format!(
                "stats:encoder gops={} bitrate={:.1}kbps fps={:.2} gop={:.2}s {}x{} {}",
                gops, bitrate_mean, fps_mean, gop_duration_mean, width, height, aspect_ratio
            ),
            LogEvent::NetworkStats {
                media_type,
                frames,
                frame_rate,
                bitrate_kbps,
            } => format!(
                "stats:network:{} frames={} rate={:.2} bitrate={:.1}kbps",
                media_type, frames, frame_rate, bitrate_kbps
            ),
            LogEvent::StatsPending { frames } => format!("stats:pending frames={}", frames),
            LogEvent::AnalysisFailed { error } => format!("stats:error {}", error),
            LogEvent::ProbeExited { outcome, .. } => format!("probe:exit {}", outcome),
            LogEvent::ProbeRestarting {
                attempt,
                max_restarts,
                delay_secs,
            } => format!(
                "probe:restart {}/{} in {:.1}s",
                attempt, max_restarts, delay_secs
            ),
            LogEvent::MonitorStopped {
                samples,
                restarts,
                duration_secs,
            } => format!(
                "monitor:stop samples={} restarts={} {:.1}s",
                samples, restarts, duration_secs
            ),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors and visual structure
    #[default]
    Pretty,
    /// JSON lines format for machine consumption
    Json,
    /// Compact single-line format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// Logger for monitor events - handles both console output and file logging
pub struct Logger {
    format: LogFormat,
    file_writer: Option<Mutex<File>>,
}

impl Logger {
    pub fn new(format: LogFormat) -> Self {
        Self {
            format,
            file_writer: None,
        }
    }

    /// Create a logger with file output in addition to console
    pub fn with_file(format: LogFormat, log_path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        Ok(Self {
            format,
            file_writer: Some(Mutex::new(file)),
        })
    }

    pub fn format(&self) -> LogFormat {
        self.format
    }

    pub fn log(&self, event: &LogEvent) {
        // File output is always JSON
        if let Some(ref writer) = self.file_writer {
            if let Ok(mut file) = writer.lock() {
                let json = event.with_timestamp();
                let _ = writeln!(file, "{}", json);
            }
        }

        match self.format {
            LogFormat::Json => self.log_json(event),
            LogFormat::Pretty => self.log_pretty(event),
            LogFormat::Compact => self.log_compact(event),
        }
    }

    fn log_json(&self, event: &LogEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{}", json);
        }
    }

    fn log_pretty(&self, event: &LogEvent) {
        let mut stderr = std::io::stderr();
        match event {
            LogEvent::MonitorStarted { url, probe_path } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{}",
                    "╭─────────────────────────────────────────────────────────────────────╮"
                        .bright_blue()
                );
                let _ = writeln!(
                    stderr,
                    "{}  {}{}",
                    "│".bright_blue(),
                    "framewatch".bold().bright_white(),
                    " ".repeat(57) + &"│".bright_blue().to_string()
                );
                let _ = writeln!(
                    stderr,
                    "{}  {} {}",
                    "│".bright_blue(),
                    "Stream:".dimmed(),
                    Self::truncate_with_padding(url, 60, 68).dimmed()
                );
                let _ = writeln!(
                    stderr,
                    "{}  {} {}",
                    "│".bright_blue(),
                    "Probe:".dimmed(),
                    Self::truncate_with_padding(probe_path, 61, 68).dimmed()
                );
                let _ = writeln!(
                    stderr,
                    "{}",
                    "╰─────────────────────────────────────────────────────────────────────╯"
                        .bright_blue()
                );
                let _ = writeln!(stderr);
            }
            LogEvent::ProbeStderr { line } => {
                let _ = writeln!(stderr, "{} {}", "    │".dimmed(), line.dimmed());
            }
            LogEvent::ProbeError { kind, message } => {
                let _ = writeln!(
                    stderr,
                    "  {} {} {}",
                    "⚠".bright_yellow(),
                    format!("[{}]", kind).yellow(),
                    message
                );
            }
            LogEvent::EncoderStats {
                gops,
                bitrate_min,
                bitrate_mean,
                bitrate_max,
                fps_mean,
                gop_duration_mean,
                aspect_ratio,
                width,
                height,
                has_audio,
                identical_gops,
            } => {
                let _ = writeln!(
                    stderr,
                    "  {} {}",
                    "▶".bright_cyan(),
                    "ENCODER".bright_cyan().bold()
                );
                let _ = writeln!(
                    stderr,
                    "    {} {}x{} ({}), {} {}",
                    "Video:".dimmed(),
                    width,
                    height,
                    aspect_ratio,
                    gops,
                    if *gops == 1 { "GOP" } else { "GOPs" }
                );
                let _ = writeln!(
                    stderr,
                    "    {} {:.1} / {:.1} / {:.1} kbps",
                    "Bitrate:".dimmed(),
                    bitrate_min,
                    bitrate_mean,
                    bitrate_max
                );
                let _ = writeln!(
                    stderr,
                    "    {} {:.2} fps, {:.2}s GOP",
                    "Timing:".dimmed(),
                    fps_mean,
                    gop_duration_mean
                );
                let structure = if *identical_gops {
                    "✓ GOP structure stable".bright_green()
                } else {
                    "→ GOP structure varies".bright_yellow()
                };
                let audio = if *has_audio {
                    "audio present".normal()
                } else {
                    "no audio".bright_yellow()
                };
                let _ = writeln!(stderr, "    {}, {}", structure, audio);
            }
            LogEvent::NetworkStats {
                media_type,
                frames,
                frame_rate,
                bitrate_kbps,
            } => {
                let _ = writeln!(
                    stderr,
                    "  {} {:<8} {} frames, {:.2}/s, {:.1} kbps",
                    "▶".bright_magenta(),
                    media_type.bright_magenta().bold(),
                    frames,
                    frame_rate,
                    bitrate_kbps
                );
            }
            LogEvent::StatsPending { frames } => {
                let _ = writeln!(
                    stderr,
                    "  {} {}",
                    "…".dimmed(),
                    format!("Waiting for a complete GOP ({} frames buffered)", frames).dimmed()
                );
            }
            LogEvent::AnalysisFailed { error } => {
                let _ = writeln!(
                    stderr,
                    "  {} Analysis failed: {}",
                    "✗".bright_red(),
                    error.bright_red()
                );
            }
            LogEvent::ProbeExited { outcome, detail } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{} Probe exited: {}",
                    "■".bright_red(),
                    outcome.bold()
                );
                if let Some(detail) = detail {
                    for line in detail.lines() {
                        let _ = writeln!(stderr, "{} {}", "    │".dimmed(), line.dimmed());
                    }
                }
            }
            LogEvent::ProbeRestarting {
                attempt,
                max_restarts,
                delay_secs,
            } => {
                let _ = writeln!(
                    stderr,
                    "{} Restarting probe ({}/{}) in {:.1}s",
                    "↻".bright_yellow(),
                    attempt,
                    max_restarts,
                    delay_secs
                );
                let _ = writeln!(stderr);
            }
            LogEvent::MonitorStopped { .. } => {
                // Printed as the final outcome by the binary
            }
        }
    }

    fn log_compact(&self, event: &LogEvent) {
        let line = event.compact_line();
        let timestamp = chrono::Utc::now().format("%H:%M:%S");
        let _ = writeln!(std::io::stderr(), "[{}] {}", timestamp, line);
    }

    /// Truncate a string and pad to exact width
    fn truncate_with_padding(s: &str, max_len: usize, total_width: usize) -> String {
        let truncated = if s.chars().count() > max_len {
            let head: String = s.chars().take(max_len - 3).collect();
            format!("{}...", head)
        } else {
            s.to_string()
        };

        let padding_needed = total_width.saturating_sub(truncated.chars().count() + 1);
        format!("{}{}│", truncated, " ".repeat(padding_needed))
    }
}
