//! Application configuration.

use crate::algorithm::{default_catalog, AlgorithmSpec};
use crate::consts::submission::{MAX_POLL_ATTEMPTS, POLL_INTERVAL_MS, REQUEST_TIMEOUT_SECS};
use crate::environment::Environment;
use crate::poller::PollPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use std::{fs, path::Path};

/// Get the path to the config file: `./apk-submit.config` if it exists, otherwise
/// `~/.apk-submit/config.json`.
pub fn get_config_path() -> Result<PathBuf, std::io::Error> {
    let local_config_path = std::env::current_dir()?.join("apk-submit.config");
    if local_config_path.exists() {
        return Ok(local_config_path);
    }

    let home_path = home::home_dir().ok_or(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        "Home directory not found",
    ))?;
    Ok(home_path.join(".apk-submit").join("config.json"))
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Environment name (`local`, `docker`, `production`). Empty means the default.
    #[serde(default)]
    pub environment: String,

    /// Upload endpoint. Empty to derive it from the environment.
    #[serde(default)]
    pub upload_url: String,

    /// Base of the per-algorithm start endpoint; the algorithm id is appended.
    #[serde(default)]
    pub signal_start_url: String,

    /// Base of the task-status endpoint; the task id is appended.
    #[serde(default)]
    pub task_url: String,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Status queries per task before giving up.
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Replaces the built-in algorithm catalog when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithms: Option<Vec<AlgorithmSpec>>,
}

fn default_poll_interval_ms() -> u64 {
    POLL_INTERVAL_MS
}

fn default_max_poll_attempts() -> u32 {
    MAX_POLL_ATTEMPTS
}

fn default_request_timeout_secs() -> u64 {
    REQUEST_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Config {
            environment: String::new(),
            upload_url: String::new(),
            signal_start_url: String::new(),
            task_url: String::new(),
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_attempts: default_max_poll_attempts(),
            request_timeout_secs: default_request_timeout_secs(),
            algorithms: None,
        }
    }
}

impl Config {
    /// Loads configuration from a JSON file at the given path.
    ///
    /// # Errors
    /// Returns an `std::io::Error` if reading from file fails or JSON is invalid.
    pub fn load_from_file(path: &Path) -> Result<Self, std::io::Error> {
        let buf = fs::read(path)?;
        let config: Config = serde_json::from_slice(&buf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(config)
    }

    /// Load the file if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, std::io::Error> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Saves the configuration to a JSON file at the given path.
    ///
    /// Directories will be created if they don't exist. This method overwrites existing files.
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Serialization failed: {}", e),
            )
        })?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Resolve endpoints. An `explicit` environment (command line or environment
    /// variable) wins over the configured one; configured URLs apply on top.
    pub fn resolve_environment(
        &self,
        explicit: Option<Environment>,
    ) -> Result<Environment, std::io::Error> {
        let base = match explicit {
            Some(environment) => environment,
            None if self.environment.is_empty() => Environment::default(),
            None => self.environment.parse::<Environment>().map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("Unknown environment {:?} in config", self.environment),
                )
            })?,
        };
        Ok(base.with_overrides(
            Some(self.upload_url.as_str()),
            Some(self.signal_start_url.as_str()),
            Some(self.task_url.as_str()),
        ))
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_millis(self.poll_interval_ms),
            self.max_poll_attempts,
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn catalog(&self) -> Vec<AlgorithmSpec> {
        self.algorithms.clone().unwrap_or_else(default_catalog)
    }
}
