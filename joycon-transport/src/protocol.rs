//! Protocol constants for Joy-Con / Pro Controller communication

/// Output report command bytes (byte 0 of an output packet)
pub mod cmd {
    /// Rumble data followed by a subcommand
    pub const SUBCOMMAND: u8 = 0x01;
    /// Rumble data only
    pub const RUMBLE_ONLY: u8 = 0x10;
    /// Rumble data followed by an MCU request
    pub const MCU_REQUEST: u8 = 0x11;

    /// Get human-readable name for command byte
    pub fn name(cmd: u8) -> &'static str {
        match cmd {
            SUBCOMMAND => "SUBCOMMAND",
            RUMBLE_ONLY => "RUMBLE_ONLY",
            MCU_REQUEST => "MCU_REQUEST",
            _ => "UNKNOWN",
        }
    }
}

/// Subcommand IDs (byte 10 of an output packet with command 0x01)
pub mod subcmd {
    pub const GET_CONTROLLER_STATE: u8 = 0x00;
    pub const MANUAL_PAIRING: u8 = 0x01;
    pub const REQUEST_DEVICE_INFO: u8 = 0x02;
    pub const SET_INPUT_REPORT_MODE: u8 = 0x03;
    pub const TRIGGER_BUTTONS_ELAPSED_TIME: u8 = 0x04;
    pub const SET_HCI_STATE: u8 = 0x06;
    pub const RESET_PAIRING_INFO: u8 = 0x07;
    pub const SET_SHIPMENT_MODE: u8 = 0x08;
    pub const SPI_FLASH_READ: u8 = 0x10;
    pub const SPI_FLASH_WRITE: u8 = 0x11;
    pub const SPI_SECTOR_ERASE: u8 = 0x12;
    pub const RESET_MCU: u8 = 0x20;
    pub const SET_MCU_CONFIG: u8 = 0x21;
    pub const SET_MCU_STATE: u8 = 0x22;
    pub const SET_PLAYER_LIGHTS: u8 = 0x30;
    pub const GET_PLAYER_LIGHTS: u8 = 0x31;
    pub const SET_HOME_LIGHT: u8 = 0x38;
    pub const ENABLE_IMU: u8 = 0x40;
    pub const SET_IMU_SENSITIVITY: u8 = 0x41;
    pub const WRITE_IMU_REGISTER: u8 = 0x42;
    pub const READ_IMU_REGISTERS: u8 = 0x43;
    pub const ENABLE_VIBRATION: u8 = 0x48;
    pub const GET_REGULATED_VOLTAGE: u8 = 0x50;

    /// Get human-readable name for subcommand byte
    pub fn name(subcmd: u8) -> &'static str {
        match subcmd {
            GET_CONTROLLER_STATE => "GET_CONTROLLER_STATE",
            MANUAL_PAIRING => "MANUAL_PAIRING",
            REQUEST_DEVICE_INFO => "REQUEST_DEVICE_INFO",
            SET_INPUT_REPORT_MODE => "SET_INPUT_REPORT_MODE",
            TRIGGER_BUTTONS_ELAPSED_TIME => "TRIGGER_BUTTONS_ELAPSED_TIME",
            SET_HCI_STATE => "SET_HCI_STATE",
            RESET_PAIRING_INFO => "RESET_PAIRING_INFO",
            SET_SHIPMENT_MODE => "SET_SHIPMENT_MODE",
            SPI_FLASH_READ => "SPI_FLASH_READ",
            SPI_FLASH_WRITE => "SPI_FLASH_WRITE",
            SPI_SECTOR_ERASE => "SPI_SECTOR_ERASE",
            RESET_MCU => "RESET_MCU",
            SET_MCU_CONFIG => "SET_MCU_CONFIG",
            SET_MCU_STATE => "SET_MCU_STATE",
            SET_PLAYER_LIGHTS => "SET_PLAYER_LIGHTS",
            GET_PLAYER_LIGHTS => "GET_PLAYER_LIGHTS",
            SET_HOME_LIGHT => "SET_HOME_LIGHT",
            ENABLE_IMU => "ENABLE_IMU",
            SET_IMU_SENSITIVITY => "SET_IMU_SENSITIVITY",
            WRITE_IMU_REGISTER => "WRITE_IMU_REGISTER",
            READ_IMU_REGISTERS => "READ_IMU_REGISTERS",
            ENABLE_VIBRATION => "ENABLE_VIBRATION",
            GET_REGULATED_VOLTAGE => "GET_REGULATED_VOLTAGE",
            _ => "UNKNOWN",
        }
    }
}

/// Input report IDs (byte 0 of an input packet)
pub mod report {
    /// Standard input report with subcommand reply
    pub const SUBCOMMAND_REPLY: u8 = 0x21;
    /// NFC/IR MCU firmware update report
    pub const MCU_UPDATE: u8 = 0x23;
    /// Standard full mode, 60 Hz
    pub const STANDARD_FULL: u8 = 0x30;
    /// NFC/IR MCU mode, 60 Hz
    pub const NFC_IR: u8 = 0x31;
    pub const UNKNOWN_32: u8 = 0x32;
    pub const UNKNOWN_33: u8 = 0x33;
    /// Simple HID mode, sent on button press
    pub const SIMPLE_HID: u8 = 0x3F;

    /// Reports carrying a subcommand reply region
    pub const REPLY_IDS: &[u8] = &[SUBCOMMAND_REPLY];
    /// Reports carrying an MCU region
    pub const MCU_IDS: &[u8] = &[MCU_UPDATE];
    /// Reports carrying the 6-axis sensor region
    pub const AXIS_IDS: &[u8] = &[STANDARD_FULL, NFC_IR, UNKNOWN_32, UNKNOWN_33];
    /// Reports carrying an NFC/IR data region
    pub const NFC_IR_IDS: &[u8] = &[NFC_IR];

    /// Get human-readable name for report ID
    pub fn name(id: u8) -> &'static str {
        match id {
            SUBCOMMAND_REPLY => "SUBCOMMAND_REPLY",
            MCU_UPDATE => "MCU_UPDATE",
            STANDARD_FULL => "STANDARD_FULL",
            NFC_IR => "NFC_IR",
            UNKNOWN_32 => "UNKNOWN_32",
            UNKNOWN_33 => "UNKNOWN_33",
            SIMPLE_HID => "SIMPLE_HID",
            _ => "UNKNOWN",
        }
    }
}

/// Subcommand reply ack bytes (byte 13 of a 0x21 report)
///
/// The high bit means ACK; the low bits name the reply data type.
pub mod ack {
    /// High bit set on every positive acknowledgement
    pub const ACK_FLAG: u8 = 0x80;
    pub const DEVICE_INFO: u8 = 0x82;
    pub const SPI_READ: u8 = 0x90;
    pub const PLAYER_LIGHTS: u8 = 0xB0;
    pub const IMU_REGISTERS: u8 = 0xC0;
    pub const VOLTAGE: u8 = 0xD0;

    /// Check whether the ack byte is positive
    #[inline]
    pub fn is_ack(ack: u8) -> bool {
        ack & ACK_FLAG != 0
    }
}

/// Packet layout offsets and sizes
pub mod layout {
    /// Output packet header length (cmd + seq + 2x rumble + subcmd)
    pub const OUTPUT_HEADER_LEN: usize = 11;
    pub const OUTPUT_COMMAND: usize = 0;
    pub const OUTPUT_SEQUENCE: usize = 1;
    pub const OUTPUT_RUMBLE_LEFT: usize = 2;
    pub const OUTPUT_RUMBLE_RIGHT: usize = 6;
    pub const OUTPUT_SUBCOMMAND: usize = 10;
    pub const RUMBLE_LEN: usize = 4;

    /// Input packet length without NFC/IR data
    pub const INPUT_STANDARD_LEN: usize = 50;
    /// Input packet length with NFC/IR data
    pub const INPUT_NFC_IR_LEN: usize = 362;

    pub const INPUT_REPORT_ID: usize = 0;
    pub const INPUT_TIMER: usize = 1;
    pub const INPUT_BATTERY: usize = 2;
    pub const INPUT_BUTTONS: usize = 3;
    pub const INPUT_LEFT_STICK: usize = 6;
    pub const INPUT_RIGHT_STICK: usize = 9;
    pub const INPUT_VIBRATOR: usize = 12;
    pub const INPUT_ACK: usize = 13;
    pub const INPUT_SUBCMD_REPLY: usize = 14;

    pub const REPLY_DATA_START: usize = 15;
    pub const REPLY_DATA_LEN: usize = 35;
    pub const MCU_REPORT_START: usize = 13;
    pub const MCU_REPORT_LEN: usize = 37;
    pub const AXIS_DATA_START: usize = 13;
    pub const AXIS_DATA_LEN: usize = 36;
    pub const NFC_IR_START: usize = 49;
    pub const NFC_IR_LEN: usize = 313;
}

/// SPI flash addresses of factory and user data
pub mod spi {
    /// Maximum bytes per SPI read/write subcommand
    pub const MAX_TRANSFER: u8 = 0x1D;

    pub const SERIAL_NUMBER: u32 = 0x6000;
    pub const FACTORY_IMU_CALIBRATION: u32 = 0x6020;
    pub const FACTORY_STICK_CALIBRATION: u32 = 0x603D;
    pub const BODY_COLOR: u32 = 0x6050;
    pub const BUTTON_COLOR: u32 = 0x6053;
    pub const SIX_AXIS_HORIZONTAL_OFFSETS: u32 = 0x6080;
    pub const LEFT_STICK_PARAMETERS: u32 = 0x6086;
    pub const RIGHT_STICK_PARAMETERS: u32 = 0x6098;
    pub const USER_STICK_CALIBRATION: u32 = 0x8010;
    pub const USER_IMU_CALIBRATION: u32 = 0x8026;
}

/// Regulated voltage thresholds (raw 0x50 reply, inclusive upper bounds)
pub mod voltage {
    pub const CRITICAL_MAX: u16 = 0x059F;
    pub const LOW_MAX: u16 = 0x05DF;
    pub const MEDIUM_MAX: u16 = 0x0617;
}

/// Maximum sequence counter value before wrapping
pub const SEQUENCE_MASK: u8 = 0x0F;

/// Default timing constants
pub mod timing {
    /// Wait for a routed reply while capture is running (ms)
    pub const REPLY_TIMEOUT_MS: u64 = 1000;
    /// How often a routed wait rechecks that capture and the session are alive (ms)
    pub const ROUTED_WAIT_SLICE_MS: u64 = 20;
    /// Direct-mode reads before giving up on a matching reply
    pub const REPLY_READ_ATTEMPTS: usize = 8;
    /// Sleep after an empty non-blocking poll read (ms)
    pub const POLL_INTERVAL_MS: u64 = 1;
    /// Sleep after a failed poll read (ms)
    pub const READ_ERROR_SLEEP_MS: u64 = 100;
    /// Consecutive poll read failures before the loop gives up
    pub const MAX_CONSECUTIVE_READ_ERRORS: u32 = 50;
    /// Unmatched replies older than this are discarded (ms)
    pub const QUEUED_REPLY_TTL_MS: u64 = 2000;
}
