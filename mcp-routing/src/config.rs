//! Control-plane configuration, loaded from a JSON file.

use crate::error::{ClusterError, ClusterResult};
use crate::observability::LogListener;
use serde::{Deserialize, Serialize};
use std::fs::{self, canonicalize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

fn default_name() -> String {
    "mcp".to_string()
}

fn default_log_level() -> i32 {
    5
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlPlaneConfig {
    #[serde(default = "default_name")]
    pub name: String,
    pub server_uid: String,
    #[serde(default)]
    pub server_name: String,
    #[serde(default)]
    pub publish_retained_delay_ms: u64,
    #[serde(default)]
    pub publish_monitoring_delay_ms: u64,
    /// Threshold handed to the log listener, on the 0 (off) to 9 scale.
    #[serde(default = "default_log_level")]
    pub log_level: i32,
}

impl ControlPlaneConfig {
    pub fn new(server_uid: &str, server_name: &str) -> Self {
        Self {
            name: default_name(),
            server_uid: server_uid.to_string(),
            server_name: server_name.to_string(),
            publish_retained_delay_ms: 0,
            publish_monitoring_delay_ms: 0,
            log_level: default_log_level(),
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> ClusterResult<Self> {
        let config_file = canonicalized_path(path.as_ref())?;
        let data = fs::read_to_string(&config_file).map_err(|error| {
            ClusterError::Config(format!("Unable to read file {config_file:?}: {error}"))
        })?;
        Self::from_json_str(&data)
    }

    pub fn from_json_str(data: &str) -> ClusterResult<Self> {
        let config: Self = serde_json::from_str(data)
            .map_err(|error| ClusterError::Config(format!("Unable to parse JSON: {error}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ClusterResult<()> {
        if self.server_uid.is_empty() {
            return Err(ClusterError::Config("server_uid must not be empty".to_string()));
        }
        if self.name.is_empty() {
            return Err(ClusterError::Config("name must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn publish_retained_delay(&self) -> Duration {
        Duration::from_millis(self.publish_retained_delay_ms)
    }

    pub fn publish_monitoring_delay(&self) -> Duration {
        Duration::from_millis(self.publish_monitoring_delay_ms)
    }

    pub fn log_listener(&self) -> LogListener {
        LogListener::new(&self.name, self.log_level)
    }
}

fn canonicalized_path(path: &Path) -> ClusterResult<PathBuf> {
    debug!("config_file: {path:?}");
    canonicalize(path).map_err(|error| {
        ClusterError::Config(format!("Config file {path:?} not found: {error}"))
    })
}
