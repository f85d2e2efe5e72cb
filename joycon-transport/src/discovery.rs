//! Device discovery for Joy-Con and Pro controllers

use hidapi::HidApi;
use tracing::{debug, info};

use crate::channel::HidApiChannel;
use crate::device_registry::{self, ControllerKind};
use crate::error::TransportError;
use crate::types::DeviceDescriptor;

/// List every HID device with `vendor_id`, regardless of product
pub fn enumerate(api: &HidApi, vendor_id: u16) -> Vec<DeviceDescriptor> {
    api.device_list()
        .filter(|d| d.vendor_id() == vendor_id)
        .map(descriptor_from_info)
        .collect()
}

fn descriptor_from_info(info: &hidapi::DeviceInfo) -> DeviceDescriptor {
    DeviceDescriptor {
        vendor_id: info.vendor_id(),
        product_id: info.product_id(),
        serial_number: info.serial_number().map(|s| s.to_string()),
        path: info.path().to_string_lossy().to_string(),
        product_name: info.product_string().map(|s| s.to_string()),
        kind: ControllerKind::from_pid(info.product_id()),
    }
}

/// HID discovery for the known controller VID/PID pairs
pub struct HidDiscovery {
    api: HidApi,
    /// Known VID/PID pairs to look for
    known_devices: Vec<(u16, u16)>,
}

impl HidDiscovery {
    /// Initialise hidapi with the default controller set
    pub fn new() -> Result<Self, TransportError> {
        let api = HidApi::new()?;
        Ok(Self::with_api(api))
    }

    /// Use an existing hidapi context
    pub fn with_api(api: HidApi) -> Self {
        Self {
            api,
            known_devices: device_registry::CONTROLLER_PIDS
                .iter()
                .map(|&pid| (device_registry::VENDOR_ID, pid))
                .collect(),
        }
    }

    /// Add a VID/PID pair to discover
    pub fn add_device(&mut self, vid: u16, pid: u16) {
        if !self.known_devices.contains(&(vid, pid)) {
            self.known_devices.push((vid, pid));
        }
    }

    /// Re-scan the bus
    pub fn refresh(&mut self) -> Result<(), TransportError> {
        Ok(self.api.refresh_devices()?)
    }

    pub fn api(&self) -> &HidApi {
        &self.api
    }

    /// List currently attached controllers
    pub fn list_devices(&self) -> Vec<DeviceDescriptor> {
        let devices: Vec<_> = self
            .api
            .device_list()
            .filter(|d| self.known_devices.contains(&(d.vendor_id(), d.product_id())))
            .map(descriptor_from_info)
            .inspect(|d| {
                debug!(
                    "Found device: VID={:04X} PID={:04X} kind={} serial={:?} path={}",
                    d.vendor_id,
                    d.product_id,
                    d.kind.name(),
                    d.serial_number,
                    d.path
                )
            })
            .collect();
        info!("Found {} controllers", devices.len());
        devices
    }

    /// Open a listed device
    pub fn open_device(&self, device: &DeviceDescriptor) -> Result<HidApiChannel, TransportError> {
        HidApiChannel::open(
            &self.api,
            device.vendor_id,
            device.product_id,
            device.serial_number.as_deref(),
        )
    }

    /// Open the first attached controller
    pub fn open_first(&self) -> Result<(DeviceDescriptor, HidApiChannel), TransportError> {
        let device = self
            .list_devices()
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::DeviceNotFound("no controller attached".into()))?;
        let channel = self.open_device(&device)?;
        Ok((device, channel))
    }
}
