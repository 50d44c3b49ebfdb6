//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use crate::Result;
use crate::error::Error;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Periodic refresh cadence
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,

    /// How many times to poll the host before giving up on readiness
    #[serde(default = "default_ready_poll_attempts")]
    pub ready_poll_attempts: u32,

    #[serde(default = "default_ready_poll_interval_ms")]
    pub ready_poll_interval_ms: u64,

    /// How many times to look for the host's token label before dropping that signal
    #[serde(default = "default_observer_retry_attempts")]
    pub observer_retry_attempts: u32,

    #[serde(default = "default_observer_retry_interval_ms")]
    pub observer_retry_interval_ms: u64,

    /// Delay before refreshing after the host finishes a generation
    #[serde(default = "default_generation_ended_delay_ms")]
    pub generation_ended_delay_ms: u64,

    /// Follow-up refresh delays after a lifecycle event
    #[serde(default = "default_follow_up_delays_ms")]
    pub follow_up_delays_ms: Vec<u64>,

    /// URL fragments that mark a generation request
    #[serde(default = "default_generation_markers")]
    pub generation_markers: Vec<String>,

    /// Preference store location
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
}

fn default_refresh_interval_ms() -> u64 {
    2500
}

fn default_ready_poll_attempts() -> u32 {
    100
}

fn default_ready_poll_interval_ms() -> u64 {
    100
}

fn default_observer_retry_attempts() -> u32 {
    10
}

fn default_observer_retry_interval_ms() -> u64 {
    1000
}

fn default_generation_ended_delay_ms() -> u64 {
    500
}

fn default_follow_up_delays_ms() -> Vec<u64> {
    vec![75, 350]
}

fn default_generation_markers() -> Vec<String> {
    vec!["/generate".to_string(), "/chat/completions".to_string()]
}

fn default_storage_path() -> PathBuf {
    config_dir().join("storage.json")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval_ms(),
            ready_poll_attempts: default_ready_poll_attempts(),
            ready_poll_interval_ms: default_ready_poll_interval_ms(),
            observer_retry_attempts: default_observer_retry_attempts(),
            observer_retry_interval_ms: default_observer_retry_interval_ms(),
            generation_ended_delay_ms: default_generation_ended_delay_ms(),
            follow_up_delays_ms: default_follow_up_delays_ms(),
            generation_markers: default_generation_markers(),
            storage_path: default_storage_path(),
        }
    }
}

impl Config {
    /// Reject values the session loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval_ms == 0 {
            return Err(Error::Config("refresh_interval_ms must be greater than 0".to_string()));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ready_poll_interval_ms)
    }

    pub fn observer_retry_interval(&self) -> Duration {
        Duration::from_millis(self.observer_retry_interval_ms)
    }

    pub fn generation_ended_delay(&self) -> Duration {
        Duration::from_millis(self.generation_ended_delay_ms)
    }

    pub fn follow_up_delays(&self) -> Vec<Duration> {
        self.follow_up_delays_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }
}

/// Get the config directory path
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".chat-tracker")
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load configuration from file
pub fn load() -> Result<Config> {
    load_from(&config_path())
}

/// Load configuration, falling back to defaults when no file exists
pub fn load_or_default() -> Result<Config> {
    let path = config_path();
    if !path.exists() {
        return Ok(Config::default());
    }
    load_from(&path)
}

fn load_from(path: &std::path::Path) -> Result<Config> {
    if !path.exists() {
        return Err(Error::Config(format!("Config not found at {:?}", path)));
    }

    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Save configuration to file
pub fn save(config: &Config) -> Result<()> {
    save_to(config, &config_path())
}

fn save_to(config: &Config, path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.refresh_interval_ms, 2500);
        assert_eq!(config.ready_poll_attempts, 100);
        assert_eq!(config.observer_retry_attempts, 10);
        assert_eq!(config.follow_up_delays(), vec![Duration::from_millis(75), Duration::from_millis(350)]);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"refresh_interval_ms": 1000}"#).unwrap();
        assert_eq!(config.refresh_interval(), Duration::from_secs(1));
        assert_eq!(config.generation_ended_delay_ms, 500);
        assert!(config.generation_markers.contains(&"/chat/completions".to_string()));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.observer_retry_attempts = 3;
        save_to(&config, &path).unwrap();

        let loaded = load_from(&path).unwrap();
        assert_eq!(loaded.observer_retry_attempts, 3);
    }

    #[test]
    fn test_zero_refresh_interval_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"refresh_interval_ms": 0}"#).unwrap();

        let err = load_from(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_from(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
