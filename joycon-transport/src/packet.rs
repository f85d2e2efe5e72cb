//! Output (host to controller) and input (controller to host) packets
//!
//! Both are thin views over a fixed-length [`ByteBuffer`]; each only exposes
//! the fields that make sense for its direction.

use std::fmt;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::buffer::ByteBuffer;
use crate::byte_codec::{self, Endian};
use crate::error::TransportError;
use crate::protocol::{layout, report, SEQUENCE_MASK};
use crate::rumble::Rumble;

// =============================================================================
// Wire headers (zerocopy)
// =============================================================================

/// Fixed 11-byte header of every output packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct OutputHeader {
    pub command: u8,
    pub sequence: u8,
    pub rumble_left: [u8; 4],
    pub rumble_right: [u8; 4],
    pub subcommand: u8,
}

/// Fixed 13-byte header shared by all standard input reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct InputHeader {
    pub report_id: u8,
    pub timer: u8,
    /// Battery level (high nibble) and connection info (low nibble)
    pub battery_connection: u8,
    pub buttons: [u8; 3],
    pub left_stick: [u8; 3],
    pub right_stick: [u8; 3],
    pub vibrator: u8,
}

// =============================================================================
// OutputPacket
// =============================================================================

/// Command packet sent to the controller
#[derive(Clone, PartialEq, Eq)]
pub struct OutputPacket {
    buf: ByteBuffer,
}

impl OutputPacket {
    /// Allocate a packet with room for `payload_len` payload bytes
    ///
    /// Both rumble blocks start out as [`Rumble::NEUTRAL`].
    pub fn new(payload_len: usize) -> Result<Self, TransportError> {
        let size = layout::OUTPUT_HEADER_LEN
            .checked_add(payload_len)
            .ok_or_else(|| {
                TransportError::Overflow(format!(
                    "payload of {payload_len} bytes overflows the packet size"
                ))
            })?;

        let mut buf = ByteBuffer::zeroed(size);
        let header = OutputHeader {
            command: 0,
            sequence: 0,
            rumble_left: Rumble::NEUTRAL.0,
            rumble_right: Rumble::NEUTRAL.0,
            subcommand: 0,
        };
        buf.write_at(0, header.as_bytes())?;
        Ok(Self { buf })
    }

    /// Build a packet whose payload region is exactly `payload`
    pub fn with_payload(payload: &[u8]) -> Result<Self, TransportError> {
        let mut packet = Self::new(payload.len())?;
        packet.set_payload(payload)?;
        Ok(packet)
    }

    pub fn command(&self) -> u8 {
        self.buf.as_slice()[layout::OUTPUT_COMMAND]
    }

    pub fn set_command(&mut self, command: u8) -> &mut Self {
        self.buf.as_mut_slice()[layout::OUTPUT_COMMAND] = command;
        self
    }

    pub fn sequence(&self) -> u8 {
        self.buf.as_slice()[layout::OUTPUT_SEQUENCE]
    }

    /// Only the low nibble is meaningful; higher bits are dropped
    pub fn set_sequence(&mut self, sequence: u8) -> &mut Self {
        self.buf.as_mut_slice()[layout::OUTPUT_SEQUENCE] = sequence & SEQUENCE_MASK;
        self
    }

    pub fn subcommand(&self) -> u8 {
        self.buf.as_slice()[layout::OUTPUT_SUBCOMMAND]
    }

    pub fn set_subcommand(&mut self, subcommand: u8) -> &mut Self {
        self.buf.as_mut_slice()[layout::OUTPUT_SUBCOMMAND] = subcommand;
        self
    }

    pub fn rumble_left(&self) -> Rumble {
        Rumble(self.rumble_at(layout::OUTPUT_RUMBLE_LEFT))
    }

    pub fn set_rumble_left(&mut self, rumble: Rumble) -> &mut Self {
        self.write_rumble(layout::OUTPUT_RUMBLE_LEFT, rumble);
        self
    }

    pub fn rumble_right(&self) -> Rumble {
        Rumble(self.rumble_at(layout::OUTPUT_RUMBLE_RIGHT))
    }

    pub fn set_rumble_right(&mut self, rumble: Rumble) -> &mut Self {
        self.write_rumble(layout::OUTPUT_RUMBLE_RIGHT, rumble);
        self
    }

    /// Payload length (`size - 11`)
    pub fn payload_len(&self) -> usize {
        self.buf.len() - layout::OUTPUT_HEADER_LEN
    }

    pub fn payload(&self) -> &[u8] {
        &self.buf.as_slice()[layout::OUTPUT_HEADER_LEN..]
    }

    /// Fill the payload region; `payload` must match its length exactly
    pub fn set_payload(&mut self, payload: &[u8]) -> Result<&mut Self, TransportError> {
        if payload.len() != self.payload_len() {
            return Err(TransportError::Length {
                expected: self.payload_len(),
                actual: payload.len(),
            });
        }
        self.buf.write_at(layout::OUTPUT_HEADER_LEN, payload)?;
        Ok(self)
    }

    /// Typed copy of the header
    pub fn header(&self) -> Result<OutputHeader, TransportError> {
        OutputHeader::read_from_prefix(self.buf.as_slice())
            .map(|(header, _)| header)
            .map_err(|_| TransportError::Length {
                expected: layout::OUTPUT_HEADER_LEN,
                actual: self.buf.len(),
            })
    }

    pub fn size(&self) -> usize {
        self.buf.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_slice()
    }

    fn rumble_at(&self, offset: usize) -> [u8; 4] {
        let mut out = [0u8; 4];
        out.copy_from_slice(&self.buf.as_slice()[offset..offset + layout::RUMBLE_LEN]);
        out
    }

    fn write_rumble(&mut self, offset: usize, rumble: Rumble) {
        self.buf.as_mut_slice()[offset..offset + layout::RUMBLE_LEN].copy_from_slice(&rumble.0);
    }
}

impl fmt::Debug for OutputPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutputPacket({})", byte_codec::hex_dump(self.as_bytes()))
    }
}

// =============================================================================
// Input report helpers
// =============================================================================

/// Battery charge level reported in the high nibble of byte 2
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BatteryLevel {
    Empty,
    Critical,
    Low,
    Medium,
    Full,
}

impl BatteryLevel {
    /// Map the 4-bit battery nibble (bit 0 is the charging flag)
    pub fn from_nibble(nibble: u8) -> Self {
        match (nibble & 0x0F) >> 1 {
            0 => Self::Empty,
            1 => Self::Critical,
            2 => Self::Low,
            3 => Self::Medium,
            _ => Self::Full,
        }
    }
}

/// Battery level plus charging state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Battery {
    pub level: BatteryLevel,
    pub charging: bool,
}

/// A physical button in the 3-byte button status field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Y,
    X,
    B,
    A,
    RightSr,
    RightSl,
    R,
    Zr,
    Minus,
    Plus,
    RightStick,
    LeftStick,
    Home,
    Capture,
    ChargingGrip,
    Down,
    Up,
    Right,
    Left,
    LeftSr,
    LeftSl,
    L,
    Zl,
}

impl Button {
    /// (byte within the status field, bit mask)
    fn position(self) -> (usize, u8) {
        match self {
            Self::Y => (0, 0x01),
            Self::X => (0, 0x02),
            Self::B => (0, 0x04),
            Self::A => (0, 0x08),
            Self::RightSr => (0, 0x10),
            Self::RightSl => (0, 0x20),
            Self::R => (0, 0x40),
            Self::Zr => (0, 0x80),
            Self::Minus => (1, 0x01),
            Self::Plus => (1, 0x02),
            Self::RightStick => (1, 0x04),
            Self::LeftStick => (1, 0x08),
            Self::Home => (1, 0x10),
            Self::Capture => (1, 0x20),
            Self::ChargingGrip => (1, 0x80),
            Self::Down => (2, 0x01),
            Self::Up => (2, 0x02),
            Self::Right => (2, 0x04),
            Self::Left => (2, 0x08),
            Self::LeftSr => (2, 0x10),
            Self::LeftSl => (2, 0x20),
            Self::L => (2, 0x40),
            Self::Zl => (2, 0x80),
        }
    }
}

/// Button bitmap: right side, shared, left side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ButtonStatus(pub [u8; 3]);

impl ButtonStatus {
    pub fn is_pressed(&self, button: Button) -> bool {
        let (byte, mask) = button.position();
        self.0[byte] & mask != 0
    }

    pub fn any_pressed(&self) -> bool {
        self.0.iter().any(|&b| b != 0)
    }
}

/// Raw 12-bit analog stick reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StickPosition {
    pub horizontal: u16,
    pub vertical: u16,
}

impl StickPosition {
    fn from_bytes(b: [u8; 3]) -> Self {
        Self {
            horizontal: u16::from(b[0]) | (u16::from(b[1] & 0x0F) << 8),
            vertical: (u16::from(b[1]) >> 4) | (u16::from(b[2]) << 4),
        }
    }
}

/// One raw 6-axis frame (accelerometer then gyroscope, x/y/z)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImuSample {
    pub accel: [i16; 3],
    pub gyro: [i16; 3],
}

/// Frames per 0x30-family report (one every 5 ms)
pub const IMU_FRAMES_PER_REPORT: usize = 3;
const IMU_FRAME_LEN: usize = 12;

// =============================================================================
// InputPacket
// =============================================================================

/// Report received from the controller
#[derive(Clone, PartialEq, Eq)]
pub struct InputPacket {
    buf: ByteBuffer,
}

impl InputPacket {
    /// Allocate an empty report buffer (362 bytes with NFC/IR, else 50)
    pub fn new(nfc_ir_enabled: bool) -> Self {
        let len = if nfc_ir_enabled {
            layout::INPUT_NFC_IR_LEN
        } else {
            layout::INPUT_STANDARD_LEN
        };
        Self {
            buf: ByteBuffer::zeroed(len),
        }
    }

    /// Wrap received bytes; only the two report sizes are accepted
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransportError> {
        match bytes.len() {
            layout::INPUT_STANDARD_LEN | layout::INPUT_NFC_IR_LEN => Ok(Self {
                buf: ByteBuffer::from_vec(bytes.to_vec()),
            }),
            actual => Err(TransportError::ReportSize { actual }),
        }
    }

    pub fn size(&self) -> usize {
        self.buf.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_slice()
    }

    /// Mutable access for reading a report straight into the buffer
    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        self.buf.as_mut_slice()
    }

    /// Zero-fill for reuse
    pub fn clear(&mut self) {
        self.buf.fill_zero();
    }

    /// A zero report ID means nothing was received
    pub fn is_empty_report(&self) -> bool {
        self.report_id() == 0
    }

    pub fn report_id(&self) -> u8 {
        self.buf.as_slice()[layout::INPUT_REPORT_ID]
    }

    pub fn timer(&self) -> u8 {
        self.buf.as_slice()[layout::INPUT_TIMER]
    }

    /// Typed copy of the 13-byte common header
    pub fn header(&self) -> Result<InputHeader, TransportError> {
        InputHeader::read_from_prefix(self.buf.as_slice())
            .map(|(header, _)| header)
            .map_err(|_| TransportError::Length {
                expected: std::mem::size_of::<InputHeader>(),
                actual: self.buf.len(),
            })
    }

    pub fn battery_level(&self) -> BatteryLevel {
        BatteryLevel::from_nibble(self.battery_nibble())
    }

    pub fn battery(&self) -> Battery {
        let nibble = self.battery_nibble();
        Battery {
            level: BatteryLevel::from_nibble(nibble),
            charging: nibble & 0x01 != 0,
        }
    }

    /// Low nibble of byte 2 (connection type / power source)
    pub fn connection_info(&self) -> u8 {
        self.buf.as_slice()[layout::INPUT_BATTERY] & 0x0F
    }

    pub fn button_status(&self) -> ButtonStatus {
        ButtonStatus(self.field3(layout::INPUT_BUTTONS))
    }

    pub fn left_stick(&self) -> StickPosition {
        StickPosition::from_bytes(self.field3(layout::INPUT_LEFT_STICK))
    }

    pub fn right_stick(&self) -> StickPosition {
        StickPosition::from_bytes(self.field3(layout::INPUT_RIGHT_STICK))
    }

    /// Fail unless the report ID is one of `expected`
    pub fn check_report_id(&self, expected: &'static [u8]) -> Result<(), TransportError> {
        let actual = self.report_id();
        if expected.contains(&actual) {
            Ok(())
        } else {
            Err(TransportError::UnexpectedReport { expected, actual })
        }
    }

    /// Subcommand ack byte (0x21 only)
    pub fn ack(&self) -> Result<u8, TransportError> {
        self.check_report_id(report::REPLY_IDS)?;
        Ok(self.buf.as_slice()[layout::INPUT_ACK])
    }

    /// Echoed subcommand ID (0x21 only)
    pub fn subcommand_id_reply(&self) -> Result<u8, TransportError> {
        self.check_report_id(report::REPLY_IDS)?;
        Ok(self.buf.as_slice()[layout::INPUT_SUBCMD_REPLY])
    }

    /// The whole 35-byte reply data region (0x21 only)
    pub fn reply_data(&self) -> Result<&[u8], TransportError> {
        self.check_report_id(report::REPLY_IDS)?;
        self.buf
            .slice(layout::REPLY_DATA_START, layout::REPLY_DATA_LEN)
    }

    /// `length` bytes of reply data starting at `offset` within the region
    pub fn reply_data_range(&self, offset: usize, length: usize) -> Result<&[u8], TransportError> {
        let data = self.reply_data()?;
        byte_codec::check_range(offset, length, data.len())?;
        Ok(&data[offset..offset + length])
    }

    /// Single reply data byte
    pub fn reply_data_at(&self, index: usize) -> Result<u8, TransportError> {
        Ok(self.reply_data_range(index, 1)?[0])
    }

    /// Little-endian integer from the reply data region
    pub fn reply_int(&self, offset: usize, length: usize) -> Result<u64, TransportError> {
        byte_codec::to_int(self.reply_data()?, offset, length, Endian::Little)
    }

    /// 37-byte MCU region (0x23 only)
    pub fn mcu_report(&self) -> Result<&[u8], TransportError> {
        self.check_report_id(report::MCU_IDS)?;
        self.buf
            .slice(layout::MCU_REPORT_START, layout::MCU_REPORT_LEN)
    }

    /// 36-byte 6-axis region (0x30..=0x33)
    pub fn axis_data(&self) -> Result<&[u8], TransportError> {
        self.check_report_id(report::AXIS_IDS)?;
        self.buf
            .slice(layout::AXIS_DATA_START, layout::AXIS_DATA_LEN)
    }

    /// 313-byte NFC/IR region (0x31 with a 362-byte buffer only)
    pub fn nfc_ir_report(&self) -> Result<&[u8], TransportError> {
        self.check_report_id(report::NFC_IR_IDS)?;
        self.buf.slice(layout::NFC_IR_START, layout::NFC_IR_LEN)
    }

    /// Decode the three 6-axis frames of a 0x30-family report
    pub fn imu_samples(&self) -> Result<[ImuSample; IMU_FRAMES_PER_REPORT], TransportError> {
        let axis = self.axis_data()?;
        let mut samples = [ImuSample::default(); IMU_FRAMES_PER_REPORT];
        for (frame, sample) in axis.chunks_exact(IMU_FRAME_LEN).zip(samples.iter_mut()) {
            let word = |i: usize| i16::from_le_bytes([frame[2 * i], frame[2 * i + 1]]);
            sample.accel = [word(0), word(1), word(2)];
            sample.gyro = [word(3), word(4), word(5)];
        }
        Ok(samples)
    }

    fn field3(&self, offset: usize) -> [u8; 3] {
        let mut out = [0u8; 3];
        out.copy_from_slice(&self.buf.as_slice()[offset..offset + 3]);
        out
    }

    fn battery_nibble(&self) -> u8 {
        self.buf.as_slice()[layout::INPUT_BATTERY] >> 4
    }
}

impl fmt::Debug for InputPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InputPacket[{}]({})",
            report::name(self.report_id()),
            byte_codec::hex_dump(self.as_bytes())
        )
    }
}
