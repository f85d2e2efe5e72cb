//! Transport error types

use std::fmt;

use thiserror::Error;

use crate::protocol::layout;

/// Errors that can occur while encoding, decoding or exchanging packets
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    // Codec / buffer errors
    #[error("Range {start}..{start}+{length} is outside a buffer of {size} bytes")]
    Range {
        start: usize,
        length: usize,
        size: usize,
    },

    #[error("Overflow: {0}")]
    Overflow(String),

    #[error("Length mismatch: expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error(
        "Input report of {actual} bytes; expected {} or {}",
        layout::INPUT_STANDARD_LEN,
        layout::INPUT_NFC_IR_LEN
    )]
    ReportSize { actual: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Protocol errors
    #[error("Unexpected report ID 0x{actual:02X}, expected {}", ReportIds(.expected))]
    UnexpectedReport {
        expected: &'static [u8],
        actual: u8,
    },

    #[error("Inconsistent rumble encoding: {0}")]
    InconsistentRumble(String),

    // Session / I/O errors
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Communication timeout")]
    Timeout,

    #[error("Session closed")]
    Closed,

    #[error("HID error: {0}")]
    HidError(String),

    #[error("HID permission denied: {0}")]
    HidPermissionDenied(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of [`TransportError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Index or length outside buffer bounds
    Range,
    /// Payload does not exactly fit a fixed region
    Length,
    /// Caller-supplied value outside the protocol's legal domain
    InvalidArgument,
    /// Device data failed an ID, ack, echo or consistency check
    Protocol,
    /// Channel open/read/write/mode failure, timeouts and closed sessions
    Io,
}

impl TransportError {
    /// Map this error onto its [`ErrorKind`]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Range { .. } | Self::Overflow(_) => ErrorKind::Range,
            Self::Length { .. } | Self::ReportSize { .. } => ErrorKind::Length,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::UnexpectedReport { .. }
            | Self::InconsistentRumble(_)
            | Self::Internal(_) => ErrorKind::Protocol,
            Self::DeviceNotFound(_)
            | Self::Timeout
            | Self::Closed
            | Self::HidError(_)
            | Self::HidPermissionDenied(_) => ErrorKind::Io,
        }
    }
}

impl From<hidapi::HidError> for TransportError {
    fn from(e: hidapi::HidError) -> Self {
        let msg = e.to_string();
        if msg.contains("Permission denied") || msg.contains("EPERM") {
            TransportError::HidPermissionDenied(msg)
        } else {
            TransportError::HidError(msg)
        }
    }
}

/// Renders a report ID set as `0x21` or `one of [0x30, 0x31]`
struct ReportIds<'a>(&'a [u8]);

impl fmt::Display for ReportIds<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            [single] => write!(f, "0x{single:02X}"),
            ids => {
                f.write_str("one of [")?;
                for (i, id) in ids.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "0x{id:02X}")?;
                }
                f.write_str("]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_report_message() {
        let err = TransportError::UnexpectedReport {
            expected: &[0x21],
            actual: 0x30,
        };
        assert_eq!(
            err.to_string(),
            "Unexpected report ID 0x30, expected 0x21"
        );

        let err = TransportError::UnexpectedReport {
            expected: &[0x30, 0x31],
            actual: 0x21,
        };
        assert_eq!(
            err.to_string(),
            "Unexpected report ID 0x21, expected one of [0x30, 0x31]"
        );
    }

    #[test]
    fn test_kinds() {
        assert_eq!(
            TransportError::Length {
                expected: 1,
                actual: 2
            }
            .kind(),
            ErrorKind::Length
        );
        assert_eq!(
            TransportError::ReportSize { actual: 64 }.kind(),
            ErrorKind::Length
        );
        assert_eq!(TransportError::Timeout.kind(), ErrorKind::Io);
        assert_eq!(
            TransportError::InconsistentRumble("x".into()).kind(),
            ErrorKind::Protocol
        );
    }
}
