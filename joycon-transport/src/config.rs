//! Session configuration
//!
//! Loaded from TOML; every field has a default so an empty document is valid.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::timing;

/// Errors loading or saving configuration files
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Tunables for a [`DeviceSession`](crate::DeviceSession)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Allocate 362-byte input buffers to receive NFC/IR data
    pub nfc_ir_enabled: bool,
    /// Wait for a routed reply while capture is running (ms)
    pub reply_timeout_ms: u64,
    /// Direct-mode reads before giving up on a matching reply
    pub reply_read_attempts: usize,
    /// Sleep after an empty poll read (ms)
    pub poll_interval_ms: u64,
    /// Sleep after a failed poll read (ms)
    pub read_error_sleep_ms: u64,
    /// Poll loop stops after this many consecutive read errors
    pub max_consecutive_read_errors: u32,
    /// Broadcast channel capacity for captured reports
    pub report_channel_capacity: usize,
    /// Unmatched subcommand replies kept for later commands
    pub max_queued_replies: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            nfc_ir_enabled: false,
            reply_timeout_ms: timing::REPLY_TIMEOUT_MS,
            reply_read_attempts: timing::REPLY_READ_ATTEMPTS,
            poll_interval_ms: timing::POLL_INTERVAL_MS,
            read_error_sleep_ms: timing::READ_ERROR_SLEEP_MS,
            max_consecutive_read_errors: timing::MAX_CONSECUTIVE_READ_ERRORS,
            report_channel_capacity: 256,
            max_queued_replies: 16,
        }
    }
}

impl SessionConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = toml::from_str(s)?;
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

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the session cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reply_read_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "reply_read_attempts",
                reason: "must be at least 1".into(),
            });
        }
        if self.report_channel_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "report_channel_capacity",
                reason: "must be at least 1".into(),
            });
        }
        if self.max_consecutive_read_errors == 0 {
            return Err(ConfigError::Invalid {
                field: "max_consecutive_read_errors",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn read_error_sleep(&self) -> Duration {
        Duration::from_millis(self.read_error_sleep_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(SessionConfig::from_toml_str("").unwrap(), SessionConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = SessionConfig::from_toml_str(
            r#"
            nfc_ir_enabled = true
            reply_timeout_ms = 250
            "#,
        )
        .unwrap();
        assert!(config.nfc_ir_enabled);
        assert_eq!(config.reply_timeout(), Duration::from_millis(250));
        assert_eq!(config.max_queued_replies, 16);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            SessionConfig::from_toml_str("reply_read_attempts = 0"),
            Err(ConfigError::Invalid {
                field: "reply_read_attempts",
                ..
            })
        ));
        assert!(matches!(
            SessionConfig::from_toml_str("poll_interval_ms = \"fast\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = SessionConfig::load("/nonexistent/joycon/session.toml").unwrap();
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn test_serialize() {
        let s = SessionConfig::default().to_toml_string().unwrap();
        assert!(s.contains("reply_timeout_ms = 1000"));
    }
}
