//! Service configuration.
//!
//! Loaded from YAML. Every field has a default, so an empty file runs six
//! unused channels against a controller on localhost. Unknown keys are
//! rejected. Channel kinds stay strings here and are checked when sampling is
//! activated.

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    externals::device::DeviceEndpoint,
    models::channel::{ChannelConfig, ConfigurationError, CHANNEL_COUNT},
    tasks::sampling::ChannelTable,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address of the ADAM controller.
    pub adam_ip: String,

    /// Modbus/TCP port of the ADAM controller.
    pub adam_port: u16,

    /// Time between polls of the controller.
    pub heartbeat_interval_ms: u64,

    /// Time to wait after a link failure before trying to sample again.
    pub reconnect_interval_ms: u64,

    /// One entry per analog input, in channel order.
    pub channels: Vec<ChannelSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelSettings {
    /// One of "None", "Temperature" or "Pressure".
    pub kind: String,

    /// Calibration polynomial, highest degree first.
    pub coefficients: Vec<f64>,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            kind: "None".to_string(),
            coefficients: vec![1.0, 0.0],
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            adam_ip: "127.0.0.1".to_string(),
            adam_port: 502,
            heartbeat_interval_ms: 1000,
            reconnect_interval_ms: 5000,
            channels: vec![ChannelSettings::default(); CHANNEL_COUNT],
        }
    }
}

impl Config {
    /// Read and parse a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(contents)?)
    }

    pub fn endpoint(&self) -> DeviceEndpoint {
        DeviceEndpoint::new(self.adam_ip.clone(), self.adam_port)
    }

    pub fn cadence(&self) -> Result<Duration, ConfigurationError> {
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigurationError::ZeroCadence);
        }
        Ok(Duration::from_millis(self.heartbeat_interval_ms))
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    /// Validate every channel and build the routing table.
    pub fn channel_table(&self) -> Result<ChannelTable, ConfigurationError> {
        let channels = self
            .channels
            .iter()
            .enumerate()
            .map(|(channel, settings)| {
                ChannelConfig::parse(channel, &settings.kind, &settings.coefficients)
            })
            .collect::<Result<Vec<_>, _>>()?;
        ChannelTable::new(channels)
    }
}
