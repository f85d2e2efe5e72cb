//! Discovery helpers that open every attached controller

use joycon_transport::{ControllerKind, DeviceDescriptor, HidDiscovery};
use tracing::{info, warn};

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::Controller;

/// List all attached controllers
pub fn list_controllers() -> Result<Vec<DeviceDescriptor>, ControllerError> {
    Ok(HidDiscovery::new()?.list_devices())
}

/// Connect to every attached Joy-Con and Pro Controller
///
/// The charging grip and unknown products are skipped. A device that fails
/// to open or initialise is logged and skipped; the rest are still returned.
pub fn connect_all(
    config: &ControllerConfig,
) -> Result<Vec<(DeviceDescriptor, Controller)>, ControllerError> {
    config.validate()?;
    let discovery = HidDiscovery::new()?;
    let mut controllers = Vec::new();

    for device in discovery.list_devices() {
        if !is_connectable(device.kind) {
            info!("Skipping {} ({:04X})", device.kind.name(), device.product_id);
            continue;
        }
        let connected = discovery
            .open_device(&device)
            .map_err(ControllerError::from)
            .and_then(|channel| Controller::connect(channel, config.clone()));
        match connected {
            Ok(controller) => controllers.push((device, controller)),
            Err(e) => warn!(
                "Failed to connect {} {:?}: {}",
                device.kind.name(),
                device.serial_number,
                e
            ),
        }
    }

    info!("Connected {} controllers", controllers.len());
    Ok(controllers)
}

fn is_connectable(kind: ControllerKind) -> bool {
    matches!(
        kind,
        ControllerKind::JoyConLeft | ControllerKind::JoyConRight | ControllerKind::ProController
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grip_and_unknown_are_skipped() {
        assert!(is_connectable(ControllerKind::JoyConLeft));
        assert!(is_connectable(ControllerKind::ProController));
        assert!(!is_connectable(ControllerKind::ChargingGrip));
        assert!(!is_connectable(ControllerKind::Unknown));
    }
}
