//! Controller settings and reply types

use std::fmt;
use std::time::Duration;

use bitflags::bitflags;
use joycon_transport::byte_codec::{self, Endian};
use joycon_transport::protocol::voltage;
use joycon_transport::{BatteryLevel, ControllerKind, TransportError};

/// Device information from subcommand 0x02
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub firmware_major: u8,
    pub firmware_minor: u8,
    /// Raw type byte: 1 = left Joy-Con, 2 = right Joy-Con, 3 = Pro Controller
    pub controller_type: u8,
    /// MAC address, most significant byte first, as `aa:bb:cc:dd:ee:ff`
    pub mac: String,
    /// Colors stored in SPI are used instead of the defaults
    pub use_spi_colors: bool,
}

impl DeviceInfo {
    /// Bytes of reply data the parser reads
    pub const REPLY_LEN: usize = 12;

    /// Parse the reply data of subcommand 0x02
    ///
    /// Layout: firmware major/minor, type, unused, six MAC bytes, unused,
    /// colors-in-SPI flag.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransportError> {
        byte_codec::check_range(0, Self::REPLY_LEN, bytes.len())?;
        Ok(Self {
            firmware_major: bytes[0],
            firmware_minor: bytes[1],
            controller_type: bytes[2],
            mac: byte_codec::to_hex_string(bytes, 4, 6, "", ":")?,
            use_spi_colors: bytes[11] == 1,
        })
    }

    /// Firmware version as `major.minor`, e.g. `3.86`
    pub fn firmware_version(&self) -> String {
        format!("{}.{}", self.firmware_major, self.firmware_minor)
    }

    /// Controller kind implied by the type byte
    pub fn kind(&self) -> ControllerKind {
        match self.controller_type {
            1 => ControllerKind::JoyConLeft,
            2 => ControllerKind::JoyConRight,
            3 => ControllerKind::ProController,
            _ => ControllerKind::Unknown,
        }
    }
}

bitflags! {
    /// Player LED state for subcommands 0x30/0x31
    ///
    /// A light that is both on and flashing stays on. Over USB, flashing
    /// lights are shown as on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PlayerLights: u8 {
        const P1_ON = 1 << 0;
        const P2_ON = 1 << 1;
        const P3_ON = 1 << 2;
        const P4_ON = 1 << 3;
        const P1_FLASH = 1 << 4;
        const P2_FLASH = 1 << 5;
        const P3_FLASH = 1 << 6;
        const P4_FLASH = 1 << 7;
    }
}

impl PlayerLights {
    /// Solid light for player 1-4
    pub fn player(n: u8) -> Option<Self> {
        match n {
            1..=4 => Self::from_bits(1 << (n - 1)),
            _ => None,
        }
    }
}

/// How long each trigger-type button was held (subcommand 0x04)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TriggerButtonElapsedTime {
    pub l: Duration,
    pub r: Duration,
    pub zl: Duration,
    pub zr: Duration,
    pub sl: Duration,
    pub sr: Duration,
    pub home: Duration,
}

impl TriggerButtonElapsedTime {
    pub const REPLY_LEN: usize = 14;

    /// Parse seven little-endian u16 millisecond counters
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransportError> {
        let ms = |index: usize| -> Result<Duration, TransportError> {
            let value = byte_codec::to_int(bytes, index * 2, 2, Endian::Little)?;
            Ok(Duration::from_millis(value))
        };
        Ok(Self {
            l: ms(0)?,
            r: ms(1)?,
            zl: ms(2)?,
            zr: ms(3)?,
            sl: ms(4)?,
            sr: ms(5)?,
            home: ms(6)?,
        })
    }
}

/// 24-bit color stored in SPI flash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransportError> {
        byte_codec::check_range(0, 3, bytes.len())?;
        Ok(Self::new(bytes[0], bytes[1], bytes[2]))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Raw calibration blocks read from SPI flash
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SensorCalibration {
    pub factory_imu: Vec<u8>,
    pub factory_stick: Vec<u8>,
    pub imu_model: Vec<u8>,
    pub left_stick_model: Vec<u8>,
    pub right_stick_model: Vec<u8>,
    pub user_stick: Vec<u8>,
    pub user_imu: Vec<u8>,
}

/// Regulated voltage from subcommand 0x50
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoltageReading {
    pub raw: u16,
}

impl VoltageReading {
    pub fn new(raw: u16) -> Self {
        Self { raw }
    }

    /// Charge bucket for this voltage; never [`BatteryLevel::Empty`]
    pub fn level(&self) -> BatteryLevel {
        if self.raw <= voltage::CRITICAL_MAX {
            BatteryLevel::Critical
        } else if self.raw <= voltage::LOW_MAX {
            BatteryLevel::Low
        } else if self.raw <= voltage::MEDIUM_MAX {
            BatteryLevel::Medium
        } else {
            BatteryLevel::Full
        }
    }

    /// Approximate voltage; one raw step is 2.5 mV
    pub fn millivolts(&self) -> f32 {
        f32::from(self.raw) * 2.5
    }
}

/// HCI state for subcommand 0x06
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HciState {
    Disconnect = 0x00,
    RebootAndReconnect = 0x01,
    RebootAndPair = 0x02,
    RebootAndReconnectHome = 0x04,
}

impl HciState {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Disconnect),
            0x01 => Some(Self::RebootAndReconnect),
            0x02 => Some(Self::RebootAndPair),
            0x04 => Some(Self::RebootAndReconnectHome),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_info_parse() {
        let data = [
            0x03, 0x56, 0x02, 0x02, 0x98, 0xb6, 0xe9, 0x01, 0x2a, 0x3f, 0x01, 0x01,
        ];
        let info = DeviceInfo::from_bytes(&data).unwrap();
        assert_eq!(info.firmware_version(), "3.86");
        assert_eq!(info.kind(), ControllerKind::JoyConRight);
        assert_eq!(info.mac, "98:b6:e9:01:2a:3f");
        assert!(info.use_spi_colors);
    }

    #[test]
    fn test_device_info_too_short() {
        assert!(DeviceInfo::from_bytes(&[0u8; 11]).is_err());
    }

    #[test]
    fn test_player_lights() {
        assert_eq!(PlayerLights::player(1), Some(PlayerLights::P1_ON));
        assert_eq!(PlayerLights::player(4), Some(PlayerLights::P4_ON));
        assert_eq!(PlayerLights::player(0), None);
        assert_eq!(PlayerLights::player(5), None);
        let lights = PlayerLights::P1_ON | PlayerLights::P3_FLASH;
        assert_eq!(lights.bits(), 0x41);
    }

    #[test]
    fn test_elapsed_time_little_endian() {
        let mut data = [0u8; 14];
        data[0] = 0x10;
        data[1] = 0x02;
        data[12] = 0xFF;
        data[13] = 0xFF;
        let t = TriggerButtonElapsedTime::from_bytes(&data).unwrap();
        assert_eq!(t.l, Duration::from_millis(0x0210));
        assert_eq!(t.r, Duration::ZERO);
        assert_eq!(t.home, Duration::from_millis(0xFFFF));
    }

    #[test]
    fn test_voltage_buckets() {
        assert_eq!(VoltageReading::new(0x0000).level(), BatteryLevel::Critical);
        assert_eq!(VoltageReading::new(0x059F).level(), BatteryLevel::Critical);
        assert_eq!(VoltageReading::new(0x05A0).level(), BatteryLevel::Low);
        assert_eq!(VoltageReading::new(0x05DF).level(), BatteryLevel::Low);
        assert_eq!(VoltageReading::new(0x0617).level(), BatteryLevel::Medium);
        assert_eq!(VoltageReading::new(0x0618).level(), BatteryLevel::Full);
    }

    #[test]
    fn test_rgb_display() {
        assert_eq!(Rgb::new(0x0a, 0xb9, 0xe6).to_string(), "#0ab9e6");
        assert!(Rgb::from_bytes(&[1, 2]).is_err());
    }

    #[test]
    fn test_hci_state() {
        assert_eq!(HciState::from_u8(0x04), Some(HciState::RebootAndReconnectHome));
        assert_eq!(HciState::from_u8(0x03), None);
    }
}
