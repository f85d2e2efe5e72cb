//! Controller interface error types

use joycon_transport::{ErrorKind, TransportError};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors from controller operations
#[derive(Error, Debug)]
pub enum ControllerError {
    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Invalid parameter value
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Device answered, but not with the reply the command asked for
    #[error("Unexpected response to subcommand 0x{subcommand:02X}: {reason}")]
    UnexpectedResponse { subcommand: u8, reason: String },

    /// SPI write or erase reported a non-zero status
    #[error("SPI operation at 0x{address:08X} failed with status 0x{status:02X}")]
    SpiStatus { address: u32, status: u8 },

    /// One of the connect-time initialisation steps failed
    #[error("Initialization failed while {step}: {source}")]
    Initialization {
        step: &'static str,
        #[source]
        source: Box<ControllerError>,
    },

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl ControllerError {
    pub(crate) fn unexpected(subcommand: u8, reason: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            subcommand,
            reason: reason.into(),
        }
    }

    /// Coarse classification shared with the transport layer
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(e) => e.kind(),
            Self::InvalidParameter(_) => ErrorKind::InvalidArgument,
            Self::UnexpectedResponse { .. } | Self::SpiStatus { .. } => ErrorKind::Protocol,
            Self::Initialization { source, .. } => source.kind(),
            Self::Config(_) => ErrorKind::InvalidArgument,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            ControllerError::InvalidParameter("x".into()).kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            ControllerError::unexpected(0x10, "bad ack").kind(),
            ErrorKind::Protocol
        );
        assert_eq!(
            ControllerError::from(TransportError::Timeout).kind(),
            ErrorKind::Io
        );
    }

    #[test]
    fn test_initialization_keeps_source_kind() {
        let err = ControllerError::Initialization {
            step: "enabling IMU",
            source: Box::new(ControllerError::unexpected(0x40, "no echo")),
        };
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(err.to_string().contains("enabling IMU"));
        assert!(err.to_string().contains("0x40"));
    }
}
