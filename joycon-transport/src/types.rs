//! Common types for the transport layer

use std::time::Instant;

use crate::device_registry::ControllerKind;
use crate::packet::InputPacket;

/// HID device seen during enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial_number: Option<String>,
    /// Platform device path
    pub path: String,
    pub product_name: Option<String>,
    pub kind: ControllerKind,
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closed,
}

/// Input report with host receive timestamp
#[derive(Debug, Clone)]
pub struct TimestampedReport {
    pub packet: InputPacket,
    pub received_at: Instant,
}

impl TimestampedReport {
    pub fn new(packet: InputPacket) -> Self {
        Self {
            packet,
            received_at: Instant::now(),
        }
    }
}

/// Manufacturer, product and serial strings reported by the device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceStrings {
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

/// Receives unsolicited reports from the capture loop
///
/// Runs on the poll thread; keep it short.
pub trait ReportHandler: Send + 'static {
    fn on_report(&mut self, packet: &InputPacket);
}

impl<F> ReportHandler for F
where
    F: FnMut(&InputPacket) + Send + 'static,
{
    fn on_report(&mut self, packet: &InputPacket) {
        self(packet)
    }
}
