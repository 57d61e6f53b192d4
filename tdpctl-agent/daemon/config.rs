use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TdpctlError};

pub const DEFAULT_INTERVAL_SECS: u64 = 5;
pub const MIN_INTERVAL_SECS: u64 = 1;

/// Daemon settings, also the body of `GET`/`PUT config`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Seconds between reconciliation ticks
    #[serde(default = "default_interval")]
    pub interval: u64,
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL_SECS,
        }
    }
}

impl DaemonConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interval < MIN_INTERVAL_SECS {
            return Err(TdpctlError::Validation(format!(
                "interval must be at least {MIN_INTERVAL_SECS} second(s)"
            )));
        }
        Ok(())
    }

    /// Load and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TdpctlError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: DaemonConfig = serde_json::from_str(&content)
            .map_err(|e| TdpctlError::Config(format!("cannot parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }
}
