//! Raw HID channel abstraction
//!
//! A session talks to the device only through [`HidChannel`]; the hidapi
//! backend and the scripted test channel both implement it.

use std::time::Duration;

use hidapi::{HidApi, HidDevice};
use tracing::debug;

use crate::error::TransportError;

/// Half-duplex byte channel to one HID device
pub trait HidChannel: Send {
    /// Read one report into `buf`; `Ok(0)` means no report was pending
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Blocking read bounded by `timeout`; `Ok(0)` on expiry
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError>;

    /// Write one report, returning the bytes written
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Switch between non-blocking (`true`) and blocking reads
    fn set_nonblocking(&mut self, nonblocking: bool) -> Result<(), TransportError>;

    /// Release the device; called once when the owning session shuts down
    fn close(&mut self) {}

    fn manufacturer_string(&self) -> Result<Option<String>, TransportError>;
    fn product_string(&self) -> Result<Option<String>, TransportError>;
    fn serial_number_string(&self) -> Result<Option<String>, TransportError>;
}

impl<C: HidChannel + ?Sized> HidChannel for Box<C> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        (**self).read(buf)
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        (**self).read_timeout(buf, timeout)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        (**self).write(data)
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> Result<(), TransportError> {
        (**self).set_nonblocking(nonblocking)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn manufacturer_string(&self) -> Result<Option<String>, TransportError> {
        (**self).manufacturer_string()
    }

    fn product_string(&self) -> Result<Option<String>, TransportError> {
        (**self).product_string()
    }

    fn serial_number_string(&self) -> Result<Option<String>, TransportError> {
        (**self).serial_number_string()
    }
}

/// [`HidChannel`] backed by a hidapi device handle
pub struct HidApiChannel {
    device: Option<HidDevice>,
    label: String,
}

impl HidApiChannel {
    /// Open a device by vendor/product ID and, if given, serial number
    pub fn open(
        api: &HidApi,
        vendor_id: u16,
        product_id: u16,
        serial_number: Option<&str>,
    ) -> Result<Self, TransportError> {
        let device = match serial_number {
            Some(serial) => api.open_serial(vendor_id, product_id, serial)?,
            None => api.open(vendor_id, product_id)?,
        };
        let label = format!(
            "{vendor_id:04x}:{product_id:04x}{}",
            serial_number.map(|s| format!(" ({s})")).unwrap_or_default()
        );
        debug!("Opened HID device {}", label);
        Ok(Self::from_device(device, label))
    }

    /// Wrap an already-open device
    pub fn from_device(device: HidDevice, label: impl Into<String>) -> Self {
        Self {
            device: Some(device),
            label: label.into(),
        }
    }

    fn device(&self) -> Result<&HidDevice, TransportError> {
        self.device.as_ref().ok_or(TransportError::Closed)
    }
}

impl HidChannel for HidApiChannel {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        Ok(self.device()?.read(buf)?)
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        let ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        Ok(self.device()?.read_timeout(buf, ms)?)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        Ok(self.device()?.write(data)?)
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> Result<(), TransportError> {
        Ok(self.device()?.set_blocking_mode(!nonblocking)?)
    }

    fn close(&mut self) {
        if self.device.take().is_some() {
            debug!("Closed HID device {}", self.label);
        }
    }

    fn manufacturer_string(&self) -> Result<Option<String>, TransportError> {
        Ok(self.device()?.get_manufacturer_string()?)
    }

    fn product_string(&self) -> Result<Option<String>, TransportError> {
        Ok(self.device()?.get_product_string()?)
    }

    fn serial_number_string(&self) -> Result<Option<String>, TransportError> {
        Ok(self.device()?.get_serial_number_string()?)
    }
}
