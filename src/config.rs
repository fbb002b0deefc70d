use crate::domain::AllowedClient;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_SUBSCRIBER_URL: &str = "https://database.radioid.net/static/users.json";

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub system_name: String,
    pub log_file: PathBuf,
    pub listen: SocketAddr,
    pub poll_interval_ms: u64,
    pub watch_log: bool,
    pub trust_proxy_headers: bool,
    pub allowed_clients: Vec<AllowedClient>,
    pub subscribers: SubscriberConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            system_name: "SVX Monitor".to_string(),
            log_file: PathBuf::from("./log/svxreflector.log"),
            listen: SocketAddr::from(([0, 0, 0, 0], 9004)),
            poll_interval_ms: 500,
            watch_log: true,
            trust_proxy_headers: false,
            allowed_clients: vec![AllowedClient::local_default()],
            subscribers: SubscriberConfig::default(),
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct SubscriberConfig {
    pub file: PathBuf,
    /// `null` disables refreshing; the local file is still loaded.
    pub url: Option<String>,
    pub reload_days: u32,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("subscriber_ids.json"),
            url: Some(DEFAULT_SUBSCRIBER_URL.to_string()),
            reload_days: 7,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("poll_interval_ms must be greater than zero")]
    ZeroPollInterval,
}

/// Reads the JSON config. No path, or a missing file, yields the defaults.
pub fn load_config(path: Option<&Path>) -> Result<MonitorConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(MonitorConfig::default());
    };
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            tracing::warn!(
                event = "config.missing",
                path = %path.display(),
                "config file not found, using defaults"
            );
            return Ok(MonitorConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let config: MonitorConfig =
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    if config.poll_interval_ms == 0 {
        return Err(ConfigError::ZeroPollInterval);
    }
    Ok(config)
}
