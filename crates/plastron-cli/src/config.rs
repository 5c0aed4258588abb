use plastron_remote::config::DEFAULT_REQUEST_TIMEOUT_SECS;
use plastron_remote::ControlConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Daemon configuration, loaded from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// Base URL of the remote control endpoint.
    pub control_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Directory holding the snapshot store and the instance lock.
    pub store_root: PathBuf,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_poll_interval() -> u64 {
    plastron_core::DEFAULT_POLL_INTERVAL_SECS
}

impl DaemonConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        toml::from_str(&content).map_err(|e| format!("invalid config {}: {e}", path.display()))
    }

    pub fn control(&self) -> ControlConfig {
        ControlConfig::new(&self.control_url).with_timeout(self.request_timeout_secs)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.store_root.join("plastron.lock")
    }
}
