//! Daemon configuration: a TOML file merged with environment overrides,
//! scaled down from the teacher's full `ConfigLoader` to the handful of
//! fields this system actually needs (§1 ambient stack).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::CoreError;

/// Top-level daemon configuration, loadable from `<dataDir>/config.toml` and
/// overridable by `OSC_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Root directory for changes/acl/keys/users/identity.json (§6.3).
    pub data_dir: PathBuf,
    /// HeadSync/DiffManager cycle interval, default 5s (§4.8).
    pub sync_period_secs: u64,
    /// TreeSyncer request-pool worker count, default 10 (§4.9).
    pub request_pool_workers: usize,
    /// Bounded queue depth per worker pool, default 256 (§4.9).
    pub worker_queue_depth: usize,
    /// Attach N changes between snapshots, default 10 (§4.2).
    pub snapshot_interval: u32,
    /// `WaitForSync` hard deadline, default 30s (§4.7).
    pub wait_for_sync_timeout_secs: u64,
    /// Space-join recovery deadline, default 10s (§5).
    pub space_join_timeout_secs: u64,
    /// Event Broker per-subscriber channel capacity, default 64 (§4.11).
    pub event_broker_capacity: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            sync_period_secs: 5,
            request_pool_workers: 10,
            worker_queue_depth: 256,
            snapshot_interval: 10,
            wait_for_sync_timeout_secs: 30,
            space_join_timeout_secs: 10,
            event_broker_capacity: 64,
        }
    }
}

impl CoreConfig {
    /// Loads from a TOML file if present, then applies `OSC_*` environment
    /// overrides. Missing file is not an error: defaults apply.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            toml::from_str(&raw)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("OSC_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("OSC_SYNC_PERIOD_SECS") {
            if let Ok(n) = v.parse() {
                self.sync_period_secs = n;
            }
        }
        if let Ok(v) = std::env::var("OSC_REQUEST_POOL_WORKERS") {
            if let Ok(n) = v.parse() {
                self.request_pool_workers = n;
            }
        }
    }

    pub fn sync_period(&self) -> Duration {
        Duration::from_secs(self.sync_period_secs)
    }

    pub fn wait_for_sync_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_for_sync_timeout_secs)
    }

    pub fn space_join_timeout(&self) -> Duration {
        Duration::from_secs(self.space_join_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_recommendations() {
        let config = CoreConfig::default();
        assert_eq!(config.sync_period_secs, 5);
        assert_eq!(config.request_pool_workers, 10);
        assert_eq!(config.worker_queue_depth, 256);
        assert_eq!(config.snapshot_interval, 10);
        assert_eq!(config.wait_for_sync_timeout_secs, 30);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = CoreConfig::load(Path::new("/nonexistent/osc-config.toml")).unwrap();
        assert_eq!(config.sync_period_secs, CoreConfig::default().sync_period_secs);
    }
}
