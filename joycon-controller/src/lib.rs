//! High-level controller interface for Nintendo Joy-Con and Pro Controller
//!
//! This crate wraps a [`DeviceSession`] with typed subcommand operations:
//! device info, report modes, player/HOME lights, IMU and vibration control,
//! SPI flash access and calibration reads.

pub mod config;
pub mod error;
pub mod settings;
pub mod sync;

pub use config::{ControllerConfig, INPUT_REPORT_MODES};
pub use error::ControllerError;
pub use settings::{
    DeviceInfo, HciState, PlayerLights, Rgb, SensorCalibration, TriggerButtonElapsedTime,
    VoltageReading,
};
pub use sync::{connect_all, list_controllers};

pub use joycon_transport::{
    DeviceSession, DeviceStrings, HidChannel, HomeLightPattern, InputPacket, ReportHandler,
    Rumble, TimestampedReport,
};

use joycon_transport::byte_codec::{self, Endian};
use joycon_transport::protocol::{ack, cmd, report, spi, subcmd};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Largest IMU register block subcommand 0x43 returns
pub const MAX_IMU_REGISTERS: u8 = 0x20;

/// Serial number block length at SPI 0x6000
const SERIAL_NUMBER_LEN: u8 = 16;

/// High-level controller interface
pub struct Controller {
    session: DeviceSession,
    config: ControllerConfig,
}

impl Controller {
    /// Open a session on `channel` and run the configured initialisation
    ///
    /// Enables vibration and the IMU and sets the input report mode, as
    /// selected in `config`. If any step fails the session is closed (which
    /// closes the channel) before the error is returned.
    pub fn connect(
        channel: impl HidChannel + 'static,
        config: ControllerConfig,
    ) -> Result<Self, ControllerError> {
        config.validate()?;
        let session = DeviceSession::new(channel, config.session.clone())?;
        let controller = Self::from_session(session, config);
        if let Err(e) = controller.initialize() {
            controller.close();
            return Err(e);
        }
        info!("Controller connected");
        Ok(controller)
    }

    /// Wrap an existing session without sending anything
    pub fn from_session(session: DeviceSession, config: ControllerConfig) -> Self {
        Self { session, config }
    }

    fn initialize(&self) -> Result<(), ControllerError> {
        if self.config.enable_vibration {
            debug!("Enabling vibration");
            self.enable_vibration(true)
                .map_err(|e| init_error("enabling vibration", e))?;
        }
        if self.config.enable_imu {
            debug!("Enabling IMU");
            self.enable_imu(true)
                .map_err(|e| init_error("enabling IMU", e))?;
        }
        debug!(
            "Setting input report mode 0x{:02X}",
            self.config.input_report_mode
        );
        self.set_input_report_mode(self.config.input_report_mode)
            .map_err(|e| init_error("setting input report mode", e))
    }

    pub fn session(&self) -> &DeviceSession {
        &self.session
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Stop capture and close the device; idempotent
    pub fn close(&self) {
        self.session.close();
    }

    // === Capture ===

    /// Start the poll loop, handing every unsolicited report to `handler`
    pub fn capture(&self, handler: impl ReportHandler) -> Result<(), ControllerError> {
        Ok(self.session.capture(handler)?)
    }

    /// Start the poll loop with only broadcast subscribers as consumers
    pub fn capture_to_subscribers(&self) -> Result<(), ControllerError> {
        Ok(self.session.capture_to_subscribers()?)
    }

    pub fn stop_capture(&self) {
        self.session.stop_capture();
    }

    pub fn subscribe_reports(&self) -> broadcast::Receiver<TimestampedReport> {
        self.session.subscribe_reports()
    }

    // === Device Info ===

    /// Firmware version, controller type, MAC and SPI color flag
    pub fn request_device_info(&self) -> Result<DeviceInfo, ControllerError> {
        let reply = self.query(subcmd::REQUEST_DEVICE_INFO, &[], Some(ack::DEVICE_INFO))?;
        Ok(DeviceInfo::from_bytes(
            reply.reply_data_range(0, DeviceInfo::REPLY_LEN)?,
        )?)
    }

    /// Manufacturer, product and serial strings from the HID descriptor
    pub fn device_strings(&self) -> Result<DeviceStrings, ControllerError> {
        Ok(self.session.device_strings()?)
    }

    /// Serial number stored in SPI flash, if the controller has one
    ///
    /// Unset serials start with a byte of 0x80 or above.
    pub fn spi_serial_number(&self) -> Result<Option<String>, ControllerError> {
        let bytes = self.spi_flash_read(spi::SERIAL_NUMBER, SERIAL_NUMBER_LEN)?;
        if bytes.first().is_some_and(|b| *b >= 0x80) {
            return Ok(None);
        }
        let serial: String = bytes
            .iter()
            .filter(|b| **b != 0)
            .map(|b| char::from(*b))
            .collect();
        Ok(Some(serial))
    }

    /// Regulated battery voltage
    pub fn get_regulated_voltage(&self) -> Result<VoltageReading, ControllerError> {
        let reply = self.query(subcmd::GET_REGULATED_VOLTAGE, &[], Some(ack::VOLTAGE))?;
        let raw = reply.reply_int(0, 2)?;
        Ok(VoltageReading::new(raw as u16))
    }

    /// How long each trigger-type button has been held
    pub fn trigger_button_elapsed_time(
        &self,
    ) -> Result<TriggerButtonElapsedTime, ControllerError> {
        let reply = self.query(subcmd::TRIGGER_BUTTONS_ELAPSED_TIME, &[], None)?;
        Ok(TriggerButtonElapsedTime::from_bytes(
            reply.reply_data_range(0, TriggerButtonElapsedTime::REPLY_LEN)?,
        )?)
    }

    // === Modes ===

    /// Select the input report mode
    ///
    /// Modes 0x00-0x02 are MCU polling modes and go out as command 0x11;
    /// the rest are subcommand 0x03 of command 0x01.
    pub fn set_input_report_mode(&self, mode: u8) -> Result<(), ControllerError> {
        if !INPUT_REPORT_MODES.contains(&mode) {
            return Err(ControllerError::InvalidParameter(format!(
                "Invalid input report mode 0x{mode:02X}"
            )));
        }
        if mode <= 0x02 {
            self.session.send_command(
                cmd::MCU_REQUEST,
                subcmd::SET_INPUT_REPORT_MODE,
                &[mode],
                Rumble::NEUTRAL,
                true,
            )?;
            return Ok(());
        }
        self.query(subcmd::SET_INPUT_REPORT_MODE, &[mode], None)?;
        Ok(())
    }

    /// Set the Bluetooth HCI state (disconnect, reboot and reconnect/pair)
    ///
    /// Valid values are 0x00, 0x01, 0x02 and 0x04.
    pub fn set_hci_state(&self, state: u8) -> Result<(), ControllerError> {
        let state = HciState::from_u8(state).ok_or_else(|| {
            ControllerError::InvalidParameter(format!("Invalid HCI state 0x{state:02X}"))
        })?;
        self.query(subcmd::SET_HCI_STATE, &[state as u8], None)?;
        Ok(())
    }

    /// Clear the pairing section of SPI flash
    pub fn reset_pairing_info(&self) -> Result<(), ControllerError> {
        self.query(subcmd::RESET_PAIRING_INFO, &[], None)?;
        Ok(())
    }

    pub fn set_shipment_mode(&self, enable: bool) -> Result<(), ControllerError> {
        self.query(subcmd::SET_SHIPMENT_MODE, &[u8::from(enable)], None)?;
        Ok(())
    }

    // === SPI Flash ===

    /// Read up to 0x1D bytes of SPI flash at `address`
    pub fn spi_flash_read(&self, address: u32, length: u8) -> Result<Vec<u8>, ControllerError> {
        check_spi_length(length)?;
        let mut payload = [0u8; 5];
        byte_codec::from_int(u64::from(address), &mut payload, 0, 4, Endian::Little)?;
        payload[4] = length;

        let reply = self.query(subcmd::SPI_FLASH_READ, &payload, Some(ack::SPI_READ))?;
        let echoed_address = reply.reply_int(0, 4)?;
        let echoed_length = reply.reply_data_at(4)?;
        if echoed_address != u64::from(address) || echoed_length != length {
            return Err(ControllerError::unexpected(
                subcmd::SPI_FLASH_READ,
                format!(
                    "asked for {length} bytes at 0x{address:08X}, got {echoed_length} at 0x{echoed_address:08X}"
                ),
            ));
        }
        Ok(reply.reply_data_range(5, usize::from(length))?.to_vec())
    }

    /// Write up to 0x1D bytes of SPI flash at `address`
    pub fn spi_flash_write(&self, address: u32, data: &[u8]) -> Result<(), ControllerError> {
        let length = u8::try_from(data.len()).map_err(|_| {
            ControllerError::InvalidParameter(format!(
                "SPI write of {} bytes exceeds 0x{:02X}",
                data.len(),
                spi::MAX_TRANSFER
            ))
        })?;
        check_spi_length(length)?;

        let mut payload = vec![0u8; 5 + data.len()];
        byte_codec::from_int(u64::from(address), &mut payload, 0, 4, Endian::Little)?;
        payload[4] = length;
        payload[5..].copy_from_slice(data);

        let reply = self.query(subcmd::SPI_FLASH_WRITE, &payload, None)?;
        check_spi_status(&reply, address)
    }

    /// Erase the 4 KiB sector containing `address`
    pub fn spi_sector_erase(&self, address: u32) -> Result<(), ControllerError> {
        let mut payload = [0u8; 4];
        byte_codec::from_int(u64::from(address), &mut payload, 0, 4, Endian::Little)?;
        let reply = self.query(subcmd::SPI_SECTOR_ERASE, &payload, None)?;
        check_spi_status(&reply, address)
    }

    /// Factory and user calibration blocks for sticks and the IMU
    pub fn sensor_calibration(&self) -> Result<SensorCalibration, ControllerError> {
        Ok(SensorCalibration {
            factory_imu: self.spi_flash_read(spi::FACTORY_IMU_CALIBRATION, 0x18)?,
            factory_stick: self.spi_flash_read(spi::FACTORY_STICK_CALIBRATION, 0x12)?,
            imu_model: self.spi_flash_read(spi::SIX_AXIS_HORIZONTAL_OFFSETS, 0x06)?,
            left_stick_model: self.spi_flash_read(spi::LEFT_STICK_PARAMETERS, 0x12)?,
            right_stick_model: self.spi_flash_read(spi::RIGHT_STICK_PARAMETERS, 0x12)?,
            user_stick: self.spi_flash_read(spi::USER_STICK_CALIBRATION, 0x16)?,
            user_imu: self.spi_flash_read(spi::USER_IMU_CALIBRATION, 0x1A)?,
        })
    }

    pub fn body_color(&self) -> Result<Rgb, ControllerError> {
        Ok(Rgb::from_bytes(&self.spi_flash_read(spi::BODY_COLOR, 3)?)?)
    }

    pub fn button_color(&self) -> Result<Rgb, ControllerError> {
        Ok(Rgb::from_bytes(&self.spi_flash_read(spi::BUTTON_COLOR, 3)?)?)
    }

    // === Lights ===

    pub fn set_player_lights(&self, lights: PlayerLights) -> Result<(), ControllerError> {
        self.session
            .send_subcommand(subcmd::SET_PLAYER_LIGHTS, &[lights.bits()], false)?;
        Ok(())
    }

    pub fn get_player_lights(&self) -> Result<PlayerLights, ControllerError> {
        let reply = self.query(subcmd::GET_PLAYER_LIGHTS, &[], Some(ack::PLAYER_LIGHTS))?;
        Ok(PlayerLights::from_bits_retain(reply.reply_data_at(0)?))
    }

    pub fn set_home_light(&self, pattern: &HomeLightPattern) -> Result<(), ControllerError> {
        self.session
            .send_subcommand(subcmd::SET_HOME_LIGHT, pattern.as_bytes(), false)?;
        Ok(())
    }

    // === IMU ===

    pub fn enable_imu(&self, enable: bool) -> Result<(), ControllerError> {
        self.query(subcmd::ENABLE_IMU, &[u8::from(enable)], None)?;
        Ok(())
    }

    /// Configure the 6-axis sensor
    ///
    /// - `gyro_sensitivity`: 0 = ±250dps, 1 = ±500dps, 2 = ±1000dps, 3 = ±2000dps
    /// - `accel_sensitivity`: 0 = ±8G, 1 = ±4G, 2 = ±2G, 3 = ±16G
    /// - `gyro_performance`: 0 = 833Hz, 1 = 208Hz
    /// - `accel_filter`: 0 = 200Hz, 1 = 100Hz anti-aliasing bandwidth
    ///
    /// Re-enabling a disabled IMU resets these to 3, 0, 1, 1.
    pub fn set_imu_sensitivity(
        &self,
        gyro_sensitivity: u8,
        accel_sensitivity: u8,
        gyro_performance: u8,
        accel_filter: u8,
    ) -> Result<(), ControllerError> {
        check_max("gyro sensitivity", gyro_sensitivity, 3)?;
        check_max("accelerometer sensitivity", accel_sensitivity, 3)?;
        check_max("gyro performance rate", gyro_performance, 1)?;
        check_max("accelerometer filter", accel_filter, 1)?;
        self.query(
            subcmd::SET_IMU_SENSITIVITY,
            &[
                gyro_sensitivity,
                accel_sensitivity,
                gyro_performance,
                accel_filter,
            ],
            None,
        )?;
        Ok(())
    }

    pub fn write_imu_register(&self, address: u8, value: u8) -> Result<(), ControllerError> {
        self.query(subcmd::WRITE_IMU_REGISTER, &[address, 0x01, value], None)?;
        Ok(())
    }

    /// Read `count` consecutive IMU registers starting at `address`
    pub fn read_imu_registers(&self, address: u8, count: u8) -> Result<Vec<u8>, ControllerError> {
        if count == 0 || count > MAX_IMU_REGISTERS {
            return Err(ControllerError::InvalidParameter(format!(
                "IMU register count must be 1-{MAX_IMU_REGISTERS}, got {count}"
            )));
        }
        let reply = self.query(
            subcmd::READ_IMU_REGISTERS,
            &[address, count],
            Some(ack::IMU_REGISTERS),
        )?;
        if reply.reply_data_at(0)? != address || reply.reply_data_at(1)? != count {
            return Err(ControllerError::unexpected(
                subcmd::READ_IMU_REGISTERS,
                format!("register range 0x{address:02X}+{count} not echoed"),
            ));
        }
        Ok(reply.reply_data_range(2, usize::from(count))?.to_vec())
    }

    // === Vibration ===

    pub fn enable_vibration(&self, enable: bool) -> Result<(), ControllerError> {
        self.session
            .send_subcommand(subcmd::ENABLE_VIBRATION, &[u8::from(enable)], false)?;
        Ok(())
    }

    /// Play `rumble` on both motors
    pub fn send_rumble(&self, rumble: Rumble) -> Result<(), ControllerError> {
        self.send_rumble_pair(rumble, rumble)
    }

    pub fn send_rumble_pair(&self, left: Rumble, right: Rumble) -> Result<(), ControllerError> {
        Ok(self.session.send_rumble(left, right)?)
    }

    // === Internals ===

    /// Blocking subcommand whose reply must echo `subcommand` with a set ack bit
    fn query(
        &self,
        subcommand: u8,
        payload: &[u8],
        expected_ack: Option<u8>,
    ) -> Result<InputPacket, ControllerError> {
        let reply = self.session.send_subcommand(subcommand, payload, true)?;
        check_reply(&reply, subcommand, expected_ack)?;
        Ok(reply)
    }
}

/// Validate the report ID, subcommand echo and ack byte of a 0x21 reply
fn check_reply(
    reply: &InputPacket,
    subcommand: u8,
    expected_ack: Option<u8>,
) -> Result<(), ControllerError> {
    reply.check_report_id(report::REPLY_IDS)?;

    let echo = reply.subcommand_id_reply()?;
    if echo != subcommand {
        return Err(ControllerError::unexpected(
            subcommand,
            format!("reply echoes subcommand 0x{echo:02X}"),
        ));
    }

    let ack_byte = reply.ack()?;
    if !ack::is_ack(ack_byte) {
        return Err(ControllerError::unexpected(
            subcommand,
            format!("not acknowledged (ack 0x{ack_byte:02X})"),
        ));
    }
    if let Some(expected) = expected_ack {
        if ack_byte != expected {
            return Err(ControllerError::unexpected(
                subcommand,
                format!("ack 0x{ack_byte:02X}, expected 0x{expected:02X}"),
            ));
        }
    }
    Ok(())
}

fn check_spi_length(length: u8) -> Result<(), ControllerError> {
    if length > spi::MAX_TRANSFER {
        return Err(ControllerError::InvalidParameter(format!(
            "SPI transfer length must be at most 0x{:02X}, got 0x{length:02X}",
            spi::MAX_TRANSFER
        )));
    }
    Ok(())
}

fn check_spi_status(reply: &InputPacket, address: u32) -> Result<(), ControllerError> {
    let status = reply.reply_data_at(0)?;
    if status != 0 {
        return Err(ControllerError::SpiStatus { address, status });
    }
    Ok(())
}

fn check_max(name: &str, value: u8, max: u8) -> Result<(), ControllerError> {
    if value > max {
        return Err(ControllerError::InvalidParameter(format!(
            "{name} must be 0-{max}, got {value}"
        )));
    }
    Ok(())
}

fn init_error(step: &'static str, source: ControllerError) -> ControllerError {
    ControllerError::Initialization {
        step,
        source: Box::new(source),
    }
}
