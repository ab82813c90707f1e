//! Runtime configuration.
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Storage key the job list is persisted under.
pub const DEFAULT_STORAGE_KEY: &str = "rank-tracker-old-pending-keywords";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Base URL of the Keyword API.
    pub api_url: String,
    /// Bearer token for the Keyword API.
    pub api_token: Option<String>,
    /// Interval between reconciliation passes while jobs are pending.
    pub poll_interval_ms: u64,
    /// Age after which a still-processing job is marked failed.
    pub pending_timeout_secs: u64,
    /// Age after which a job of any state is dropped on startup.
    pub retention_hours: u64,
    pub request_timeout_secs: u64,
    pub storage_dir: PathBuf,
    pub storage_key: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".into(),
            api_token: None,
            poll_interval_ms: 2500,
            pending_timeout_secs: 15 * 60,
            retention_hours: 24,
            request_timeout_secs: 30,
            storage_dir: PathBuf::from(".rank-tracker"),
            storage_key: DEFAULT_STORAGE_KEY.into(),
        }
    }
}

impl Settings {
    /// Reads settings from a YAML file. Keys left out take their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_yaml_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be greater than 0",
            ));
        }
        if self.storage_key.is_empty() {
            return Err(ConfigError::Invalid("storage_key must not be empty"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn pending_timeout(&self) -> Duration {
        Duration::from_secs(self.pending_timeout_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours * 60 * 60)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();

        assert_eq!(settings.poll_interval(), Duration::from_millis(2500));
        assert_eq!(settings.pending_timeout(), Duration::from_secs(900));
        assert_eq!(settings.retention(), Duration::from_secs(86_400));
        assert_eq!(settings.storage_key, "rank-tracker-old-pending-keywords");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_yaml_overrides_some_keys() {
        let settings = Settings::from_yaml_str(
            "api_url: https://api.example.com\npoll_interval_ms: 1000\n",
        )
        .unwrap();

        assert_eq!(settings.api_url, "https://api.example.com");
        assert_eq!(settings.poll_interval_ms, 1000);
        assert_eq!(settings.retention_hours, 24);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Settings::from_yaml_str("poll_interval: 5\n").is_err());

        let settings = Settings {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::from_yaml_file(&dir.path().join("nope.yaml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
