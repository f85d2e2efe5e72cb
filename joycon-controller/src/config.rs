//! Controller configuration
//!
//! Connect-time initialisation options plus the nested session tunables,
//! stored as TOML:
//!
//! ```toml
//! enable_vibration = true
//! enable_imu = true
//! input_report_mode = 0x30
//!
//! [session]
//! reply_timeout_ms = 500
//! ```

use std::path::Path;

use joycon_transport::protocol::report;
use serde::{Deserialize, Serialize};

pub use joycon_transport::{ConfigError, SessionConfig};

/// Input report modes accepted by subcommand 0x03
pub const INPUT_REPORT_MODES: &[u8] = &[
    0x00,
    0x01,
    0x02,
    report::MCU_UPDATE,
    report::STANDARD_FULL,
    report::NFC_IR,
    report::SIMPLE_HID,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Turn on the vibration motors during connect
    pub enable_vibration: bool,
    /// Turn on the 6-axis sensor during connect
    pub enable_imu: bool,
    /// Input report mode set during connect
    pub input_report_mode: u8,
    pub session: SessionConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            enable_vibration: true,
            enable_imu: true,
            input_report_mode: report::STANDARD_FULL,
            session: SessionConfig::default(),
        }
    }
}

impl ControllerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: ControllerConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file; a missing file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_toml_str(&std::fs::read_to_string(path)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !INPUT_REPORT_MODES.contains(&self.input_report_mode) {
            return Err(ConfigError::Invalid {
                field: "input_report_mode",
                reason: format!(
                    "0x{:02X} is not a known input report mode",
                    self.input_report_mode
                ),
            });
        }
        self.session.validate()
    }
}
