//! Project configuration file support for framewatch.
//!
//! Loads configuration from `framewatch.toml` in the working directory.

use anyhow::{Context, Result};
use framewatch_probe::MonitorOptions;
use serde::Deserialize;
use std::path::Path;

/// Project-level configuration loaded from `framewatch.toml`
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Probe process settings
    #[serde(default)]
    pub probe: MonitorOptions,
    /// Monitoring run settings
    #[serde(default)]
    pub monitor: MonitorSection,
}

/// The `[monitor]` section
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MonitorSection {
    pub stats_interval_secs: Option<u64>,
    pub max_restarts: Option<u32>,
    pub restart_delay_ms: Option<u64>,
    pub max_pending_frames: Option<usize>,
}

/// The config file name
pub const CONFIG_FILE_NAME: &str = "framewatch.toml";

impl ProjectConfig {
    /// Load configuration from the working directory.
    ///
    /// Returns:
    /// - `Ok(Some(config))` if file exists and parses successfully
    /// - `Ok(None)` if file does not exist
    /// - `Err(...)` if file exists but fails to parse (hard error)
    pub fn load(working_dir: &Path) -> Result<Option<Self>> {
        let config_path = working_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: ProjectConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        Ok(Some(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(ProjectConfig::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_load_both_sections() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"
[probe]
probe_path = "/usr/local/bin/ffprobe"
timeout_ms = 5000
log_level = "warning"

[monitor]
stats_interval_secs = 30
max_restarts = 10
"#,
        )
        .unwrap();

        let config = ProjectConfig::load(dir.path()).unwrap().unwrap();
        assert_eq!(
            config.probe.probe_path,
            Some(PathBuf::from("/usr/local/bin/ffprobe"))
        );
        assert_eq!(config.probe.timeout_ms, Some(5000));
        assert_eq!(config.probe.log_level.as_deref(), Some("warning"));
        assert_eq!(config.probe.buffer_max_length, None);
        assert_eq!(config.monitor.stats_interval_secs, Some(30));
        assert_eq!(config.monitor.max_restarts, Some(10));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[probe]\ntimeout = 5000\n",
        )
        .unwrap();

        let err = ProjectConfig::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "").unwrap();

        let config = ProjectConfig::load(dir.path()).unwrap().unwrap();
        assert!(config.probe.probe_path.is_none());
        assert!(config.monitor.max_restarts.is_none());
    }
}
