//! Protocol engine for Nintendo Joy-Con and Pro Controller communication
//!
//! This crate covers everything between raw HID reports and typed
//! controller operations:
//!
//! - Byte codecs and the fixed-length packet model (output commands, input reports)
//! - HD rumble and HOME light encoders
//! - The [`HidChannel`] seam with a hidapi backend and device discovery
//! - [`DeviceSession`]: sequencing, channel locking, the capture loop and
//!   reply correlation

pub mod buffer;
pub mod byte_codec;
pub mod channel;
pub mod config;
pub mod device_registry;
pub mod error;
pub mod home_light;
pub mod packet;
pub mod protocol;
pub mod rumble;
pub mod session;
pub mod types;

mod discovery;
mod reply_router;

#[cfg(any(test, feature = "mock-hid"))]
pub mod mock;

pub use buffer::ByteBuffer;
pub use byte_codec::Endian;
pub use channel::{HidApiChannel, HidChannel};
pub use config::{ConfigError, SessionConfig};
pub use device_registry::{ControllerKind, VENDOR_ID};
pub use discovery::{enumerate, HidDiscovery};
pub use error::{ErrorKind, TransportError};
pub use home_light::HomeLightPattern;
pub use packet::{
    Battery, BatteryLevel, Button, ButtonStatus, ImuSample, InputHeader, InputPacket,
    OutputHeader, OutputPacket, StickPosition,
};
pub use reply_router::Expectation;
pub use rumble::{Rumble, RumbleWaveform};
pub use session::DeviceSession;
pub use types::{DeviceDescriptor, DeviceStrings, ReportHandler, SessionState, TimestampedReport};

// Re-export hidapi so callers can build an HidApi without a direct dependency
pub use hidapi;
