// Audiocine - Audio description cinema for mobile
// Copyright (C) 2025 Audiocine contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Core configuration
//!
//! All tunables of the playback/download core in one serde struct. The
//! Android host normally builds it from JSON handed over the JNI bridge; the
//! desktop CLI loads it from a TOML file. Every field has a default so partial
//! documents are accepted.
//!
//! ```toml
//! [storage]
//! database_path = "/data/user/0/app/databases/audiocine.db"
//! download_root = "/storage/emulated/0/Android/data/app/files"
//!
//! [downloads]
//! max_concurrent_downloads = 3
//! ```

use crate::error::{AudiocineError, Result};
use crate::net::Credentials;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub downloads: DownloadConfig,

    #[serde(default)]
    pub playback: PlaybackConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Root under which the per-content-type folders are created
    #[serde(default = "default_download_root")]
    pub download_root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Applies to response headers and to each body chunk
    #[serde(default = "default_timeout_secs")]
    pub read_timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Re-enqueue QUEUED/DOWNLOADING rows left over from a previous process
    #[serde(default = "default_true")]
    pub resume_pending_on_start: bool,

    #[serde(default = "default_true")]
    pub remove_partial_files: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_save_interval")]
    pub progress_save_interval_ms: u64,

    /// How often the auto-advance window is checked
    #[serde(default = "default_poll_interval")]
    pub position_poll_interval_ms: u64,

    /// Grace period between starting the player and issuing the resume seek
    #[serde(default = "default_seek_delay")]
    pub initial_seek_delay_ms: u64,

    #[serde(default = "default_notice_ms")]
    pub auto_advance_notice_ms: i64,

    #[serde(default = "default_trigger_ms")]
    pub auto_advance_trigger_ms: i64,
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("Audiocine/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_concurrent() -> usize {
    3
}

fn default_save_interval() -> u64 {
    2_000
}

fn default_poll_interval() -> u64 {
    500
}

fn default_seek_delay() -> u64 {
    300
}

fn default_notice_ms() -> i64 {
    10_000
}

fn default_trigger_ms() -> i64 {
    1_000
}

fn default_database_path() -> PathBuf {
    default_data_dir().join("audiocine.db")
}

fn default_download_root() -> PathBuf {
    default_data_dir().join("downloads")
}

/// Platform application data directory
///
/// Android and iOS hosts always override the storage section; these values
/// only matter for the desktop CLI.
pub fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home)
            .join("Library")
            .join("Application Support")
            .join("Audiocine")
    }

    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".local").join("share").join("Audiocine")
    }

    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(appdata).join("Audiocine")
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        PathBuf::from(".")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            download_root: default_download_root(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_timeout_secs(),
            read_timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            credentials: None,
        }
    }
}

impl NetworkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: default_max_concurrent(),
            resume_pending_on_start: true,
            remove_partial_files: true,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            progress_save_interval_ms: default_save_interval(),
            position_poll_interval_ms: default_poll_interval(),
            initial_seek_delay_ms: default_seek_delay(),
            auto_advance_notice_ms: default_notice_ms(),
            auto_advance_trigger_ms: default_trigger_ms(),
        }
    }
}

impl PlaybackConfig {
    pub fn save_interval(&self) -> Duration {
        Duration::from_millis(self.progress_save_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.position_poll_interval_ms)
    }

    pub fn initial_seek_delay(&self) -> Duration {
        Duration::from_millis(self.initial_seek_delay_ms)
    }
}

impl CoreConfig {
    /// Parse a TOML document and validate it
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: CoreConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document (the form the JNI bridge receives)
    pub fn from_json_str(contents: &str) -> Result<Self> {
        let config: CoreConfig = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file, falling back to defaults when it does not exist
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        debug!("Loading config from {}", path.display());
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AudiocineError::ConfigurationError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.downloads.max_concurrent_downloads == 0 {
            return Err(AudiocineError::ConfigurationError(
                "downloads.max_concurrent_downloads must be at least 1".to_string(),
            ));
        }
        if self.playback.progress_save_interval_ms == 0 || self.playback.position_poll_interval_ms == 0 {
            return Err(AudiocineError::ConfigurationError(
                "playback intervals must be greater than zero".to_string(),
            ));
        }
        if self.playback.auto_advance_trigger_ms <= 0
            || self.playback.auto_advance_trigger_ms >= self.playback.auto_advance_notice_ms
        {
            return Err(AudiocineError::ConfigurationError(format!(
                "auto-advance trigger ({} ms) must be positive and below the notice threshold ({} ms)",
                self.playback.auto_advance_trigger_ms, self.playback.auto_advance_notice_ms
            )));
        }
        if self.network.connect_timeout_secs == 0 || self.network.read_timeout_secs == 0 {
            return Err(AudiocineError::ConfigurationError(
                "network timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.downloads.max_concurrent_downloads, 3);
        assert_eq!(config.playback.progress_save_interval_ms, 2_000);
        assert_eq!(config.playback.auto_advance_notice_ms, 10_000);
        assert_eq!(config.playback.auto_advance_trigger_ms, 1_000);
        assert_eq!(config.network.connect_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = CoreConfig::from_toml_str(
            r#"
            [storage]
            database_path = "/tmp/a.db"
            download_root = "/tmp/dl"

            [downloads]
            remove_partial_files = false

            [network.credentials]
            username = "user"
            password = "secret"
            "#,
        )
        .expect("Failed to parse config");

        assert_eq!(config.storage.database_path, PathBuf::from("/tmp/a.db"));
        assert!(!config.downloads.remove_partial_files);
        assert_eq!(config.downloads.max_concurrent_downloads, 3);
        assert_eq!(
            config.network.credentials.map(|c| c.username),
            Some("user".to_string())
        );
    }

    #[test]
    fn test_rejects_bad_thresholds() {
        let err = CoreConfig::from_toml_str(
            r#"
            [playback]
            auto_advance_notice_ms = 1000
            auto_advance_trigger_ms = 5000
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, AudiocineError::ConfigurationError(_)));

        let err = CoreConfig::from_toml_str("[downloads]\nmax_concurrent_downloads = 0").unwrap_err();
        assert!(matches!(err, AudiocineError::ConfigurationError(_)));
    }

    #[test]
    fn test_json_config() {
        let config = CoreConfig::from_json_str(r#"{"downloads":{"max_concurrent_downloads":2}}"#)
            .expect("Failed to parse JSON config");
        assert_eq!(config.downloads.max_concurrent_downloads, 2);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = CoreConfig::load(dir.path().join("missing.toml")).expect("Failed to load");
        assert_eq!(config.downloads.max_concurrent_downloads, 3);
    }
}
