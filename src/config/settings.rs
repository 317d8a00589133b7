//! Application settings

use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Database file path
    pub database_path: String,

    /// Host identifier; resolved from the OS when unset
    pub host_id: Option<String>,

    /// Seconds between scheduled reconciliation cycles
    pub scan_interval_secs: u64,

    /// Timeout for the external port-listing call
    pub snapshot_timeout_secs: u64,

    /// Log level
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: Self::default_db_path().to_string_lossy().to_string(),
            host_id: None,
            scan_interval_secs: 3600,
            snapshot_timeout_secs: 10,
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from file or create default
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = path
            .map(PathBuf::from)
            .unwrap_or_else(Self::default_config_path);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Self = serde_json::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Self::default())
        }
    }

    /// Save settings to file
    pub fn save(&self, path: Option<&str>) -> Result<()> {
        let config_path = path
            .map(PathBuf::from)
            .unwrap_or_else(Self::default_config_path);

        // Create parent directory if needed
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    /// Get default config directory
    pub fn config_dir() -> PathBuf {
        ProjectDirs::from("dev", "portwatch", "portwatch")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".config")
                    .join("portwatch")
            })
    }

    /// Get default config file path
    pub fn default_config_path() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// Get default database path
    pub fn default_db_path() -> PathBuf {
        Self::config_dir().join("portwatch.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = Settings::default();
        assert_eq!(settings.scan_interval_secs, 3600);
        assert_eq!(settings.log_level, "info");
        assert!(settings.host_id.is_none());
    }

    #[test]
    fn save_and_reload_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "portwatch-settings-{}.json",
            std::process::id()
        ));
        let mut settings = Settings::default();
        settings.scan_interval_secs = 120;
        settings.save(path.to_str()).unwrap();
        let loaded = Settings::load(path.to_str()).unwrap();
        assert_eq!(loaded.scan_interval_secs, 120);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn partial_config_file_fills_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"scan_interval_secs": 60}"#).unwrap();
        assert_eq!(settings.scan_interval_secs, 60);
        assert_eq!(settings.snapshot_timeout_secs, 10);
    }
}
