//! Controller configuration, read from a TOML file.
//!
//! ```toml
//! [connection]
//! dgi-hostname = "localhost"
//! dgi-port = 1870
//! listen-port = 5001
//!
//! [heartbeat]          # optional
//! hold-ms = 500
//! rest-ms = 500
//! connect-timeout-ms = 5000
//!
//! [disconnect]         # optional
//! max-attempts = 0     # 0 retries forever
//! backoff-ms = 0
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::disconnect::RetryPolicy;
use crate::error::SimError;
use crate::protocol::HeartbeatTiming;
use crate::session::Endpoint;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ControllerConfig {
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub disconnect: DisconnectConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConnectionConfig {
    pub dgi_hostname: String,
    pub dgi_port: u16,
    pub listen_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct HeartbeatConfig {
    pub hold_ms: u64,
    pub rest_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            hold_ms: 500,
            rest_ms: 500,
            connect_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct DisconnectConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl ControllerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            SimError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, SimError> {
        let config: ControllerConfig =
            toml::from_str(raw).map_err(|e| SimError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), SimError> {
        if self.connection.dgi_hostname.trim().is_empty() {
            return Err(SimError::Configuration(
                "dgi-hostname must not be empty".to_string(),
            ));
        }
        if self.heartbeat.connect_timeout_ms == 0 {
            return Err(SimError::Configuration(
                "heartbeat connect-timeout-ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(
            self.connection.dgi_hostname.clone(),
            self.connection.dgi_port,
            self.connection.listen_port,
        )
    }

    pub fn heartbeat_timing(&self) -> HeartbeatTiming {
        HeartbeatTiming {
            hold: Duration::from_millis(self.heartbeat.hold_ms),
            rest: Duration::from_millis(self.heartbeat.rest_ms),
            connect_timeout: Duration::from_millis(self.heartbeat.connect_timeout_ms),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: match self.disconnect.max_attempts {
                0 => None,
                n => Some(n),
            },
            backoff: Duration::from_millis(self.disconnect.backoff_ms),
        }
    }
}
