use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ConfigError;

pub const DEFAULT_PROBE_PATH: &str = "ffprobe";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_BUFFER_MAX_LENGTH: usize = 1024 * 1024;
pub const DEFAULT_STOP_GUARD_TIMEOUT_MS: u64 = 2_000;

/// Largest millisecond value that still fits once passed to the probe in µs
pub const MAX_DURATION_MS: u64 = u64::MAX / 1000;

/// Probe log verbosity, least to most verbose
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Quiet,
    Panic,
    Fatal,
    #[default]
    Error,
    Warning,
    Info,
    Verbose,
    Debug,
    Trace,
}

impl LogLevel {
    pub const ALL: [LogLevel; 9] = [
        LogLevel::Quiet,
        LogLevel::Panic,
        LogLevel::Fatal,
        LogLevel::Error,
        LogLevel::Warning,
        LogLevel::Info,
        LogLevel::Verbose,
        LogLevel::Debug,
        LogLevel::Trace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Quiet => "quiet",
            LogLevel::Panic => "panic",
            LogLevel::Fatal => "fatal",
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Info => "info",
            LogLevel::Verbose => "verbose",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| ConfigError::InvalidLogLevel(s.to_string()))
    }
}

/// True if `level` names one of the probe's log levels
pub fn is_valid_log_level(level: &str) -> bool {
    level.parse::<LogLevel>().is_ok()
}

/// Raw, unvalidated monitor settings as read from a config file or flags.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorOptions {
    pub probe_path: Option<PathBuf>,
    pub timeout_ms: Option<u64>,
    pub analyze_duration_ms: Option<u64>,
    pub buffer_max_length: Option<usize>,
    pub log_level: Option<String>,
    pub stop_guard_timeout_ms: Option<u64>,
}

impl MonitorOptions {
    /// Fill unset fields from `fallback`.
    pub fn or(self, fallback: MonitorOptions) -> Self {
        Self {
            probe_path: self.probe_path.or(fallback.probe_path),
            timeout_ms: self.timeout_ms.or(fallback.timeout_ms),
            analyze_duration_ms: self.analyze_duration_ms.or(fallback.analyze_duration_ms),
            buffer_max_length: self.buffer_max_length.or(fallback.buffer_max_length),
            log_level: self.log_level.or(fallback.log_level),
            stop_guard_timeout_ms: self.stop_guard_timeout_ms.or(fallback.stop_guard_timeout_ms),
        }
    }
}

/// Validated monitor configuration. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    probe_path: PathBuf,
    timeout_ms: u64,
    analyze_duration_ms: Option<u64>,
    buffer_max_length: usize,
    log_level: LogLevel,
    stop_guard_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            probe_path: PathBuf::from(DEFAULT_PROBE_PATH),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            analyze_duration_ms: None,
            buffer_max_length: DEFAULT_BUFFER_MAX_LENGTH,
            log_level: LogLevel::default(),
            stop_guard_timeout_ms: DEFAULT_STOP_GUARD_TIMEOUT_MS,
        }
    }
}

impl MonitorConfig {
    /// Validate options in a single pass, applying defaults for unset fields.
    pub fn from_options(options: MonitorOptions) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let probe_path = options.probe_path.unwrap_or(defaults.probe_path);
        if probe_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidProbePath(probe_path));
        }

        let timeout_ms = positive("timeout_ms", options.timeout_ms, defaults.timeout_ms)?;
        let timeout_ms = microsecond_safe("timeout_ms", timeout_ms)?;
        let analyze_duration_ms = match options.analyze_duration_ms {
            Some(0) => return Err(ConfigError::NotPositive { field: "analyze_duration_ms" }),
            Some(ms) => Some(microsecond_safe("analyze_duration_ms", ms)?),
            None => None,
        };
        let buffer_max_length = match options.buffer_max_length {
            Some(0) => return Err(ConfigError::NotPositive { field: "buffer_max_length" }),
            Some(n) => n,
            None => defaults.buffer_max_length,
        };
        let log_level = match options.log_level {
            Some(level) => level.parse()?,
            None => defaults.log_level,
        };
        let stop_guard_timeout_ms = positive(
            "stop_guard_timeout_ms",
            options.stop_guard_timeout_ms,
            defaults.stop_guard_timeout_ms,
        )?;

        Ok(Self {
            probe_path,
            timeout_ms,
            analyze_duration_ms,
            buffer_max_length,
            log_level,
            stop_guard_timeout_ms,
        })
    }

    pub fn probe_path(&self) -> &Path {
        &self.probe_path
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    pub fn analyze_duration_ms(&self) -> Option<u64> {
        self.analyze_duration_ms
    }

    pub fn buffer_max_length(&self) -> usize {
        self.buffer_max_length
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    pub fn stop_guard_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_guard_timeout_ms)
    }
}

fn positive(field: &'static str, value: Option<u64>, default: u64) -> Result<u64, ConfigError> {
    match value {
        Some(0) => Err(ConfigError::NotPositive { field }),
        Some(v) => Ok(v),
        None => Ok(default),
    }
}

fn microsecond_safe(field: &'static str, ms: u64) -> Result<u64, ConfigError> {
    if ms > MAX_DURATION_MS {
        return Err(ConfigError::TooLarge {
            field,
            max: MAX_DURATION_MS,
        });
    }
    Ok(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_vocabulary() {
        for level in [
            "quiet", "panic", "fatal", "error", "warning", "info", "verbose", "debug", "trace",
        ] {
            assert!(is_valid_log_level(level), "{} should be valid", level);
        }
        assert!(!is_valid_log_level("warn"));
        assert!(!is_valid_log_level("ERROR"));
        assert!(!is_valid_log_level(""));
    }

    #[test]
    fn test_log_levels_are_ordered() {
        assert!(LogLevel::Quiet < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Trace);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!(LogLevel::Verbose.to_string(), "verbose");
    }

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::from_options(MonitorOptions::default()).unwrap();
        assert_eq!(config, MonitorConfig::default());
        assert_eq!(config.probe_path(), Path::new("ffprobe"));
        assert_eq!(config.log_level(), LogLevel::Error);
        assert_eq!(config.analyze_duration_ms(), None);
    }

    #[test]
    fn test_explicit_options() {
        let config = MonitorConfig::from_options(MonitorOptions {
            probe_path: Some(PathBuf::from("/opt/ffmpeg/bin/ffprobe")),
            timeout_ms: Some(5000),
            analyze_duration_ms: Some(1500),
            buffer_max_length: Some(4096),
            log_level: Some("info".to_string()),
            stop_guard_timeout_ms: Some(250),
        })
        .unwrap();

        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.analyze_duration_ms(), Some(1500));
        assert_eq!(config.buffer_max_length(), 4096);
        assert_eq!(config.log_level(), LogLevel::Info);
        assert_eq!(config.stop_guard_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_options() {
        let cases = [
            MonitorOptions {
                probe_path: Some(PathBuf::new()),
                ..Default::default()
            },
            MonitorOptions {
                timeout_ms: Some(0),
                ..Default::default()
            },
            MonitorOptions {
                analyze_duration_ms: Some(0),
                ..Default::default()
            },
            MonitorOptions {
                buffer_max_length: Some(0),
                ..Default::default()
            },
            MonitorOptions {
                log_level: Some("loud".to_string()),
                ..Default::default()
            },
            MonitorOptions {
                stop_guard_timeout_ms: Some(0),
                ..Default::default()
            },
            MonitorOptions {
                timeout_ms: Some(MAX_DURATION_MS + 1),
                ..Default::default()
            },
            MonitorOptions {
                analyze_duration_ms: Some(u64::MAX),
                ..Default::default()
            },
        ];

        for options in cases {
            assert!(MonitorConfig::from_options(options.clone()).is_err(), "{:?}", options);
        }
    }

    #[test]
    fn test_durations_must_fit_in_microseconds() {
        let err = MonitorConfig::from_options(MonitorOptions {
            timeout_ms: Some(18_446_744_073_709_552),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::TooLarge {
                field: "timeout_ms",
                max: MAX_DURATION_MS,
            }
        );

        let config = MonitorConfig::from_options(MonitorOptions {
            timeout_ms: Some(MAX_DURATION_MS),
            analyze_duration_ms: Some(MAX_DURATION_MS),
            ..Default::default()
        })
        .unwrap();
        let args = crate::build_args(&config, "srt://example:9000");
        assert!(args.contains(&(MAX_DURATION_MS * 1000).to_string()));
    }

    #[test]
    fn test_options_merge() {
        let cli = MonitorOptions {
            timeout_ms: Some(100),
            ..Default::default()
        };
        let file = MonitorOptions {
            timeout_ms: Some(200),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        let merged = cli.or(file);
        assert_eq!(merged.timeout_ms, Some(100));
        assert_eq!(merged.log_level.as_deref(), Some("debug"));
    }
}
