//! Device registry - controller kind detection by PID

/// Nintendo vendor ID
pub const VENDOR_ID: u16 = 0x057E;

pub const JOYCON_LEFT_PID: u16 = 0x2006;
pub const JOYCON_RIGHT_PID: u16 = 0x2007;
pub const PRO_CONTROLLER_PID: u16 = 0x2009;
/// Charging grip with both Joy-Cons attached over USB
pub const CHARGING_GRIP_PID: u16 = 0x200E;

/// Known controller PIDs
pub const CONTROLLER_PIDS: &[u16] = &[
    JOYCON_LEFT_PID,
    JOYCON_RIGHT_PID,
    PRO_CONTROLLER_PID,
    CHARGING_GRIP_PID,
];

/// Controller kind derived from the USB/BT product ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerKind {
    JoyConLeft,
    JoyConRight,
    ProController,
    ChargingGrip,
    Unknown,
}

impl ControllerKind {
    pub fn from_pid(pid: u16) -> Self {
        match pid {
            JOYCON_LEFT_PID => Self::JoyConLeft,
            JOYCON_RIGHT_PID => Self::JoyConRight,
            PRO_CONTROLLER_PID => Self::ProController,
            CHARGING_GRIP_PID => Self::ChargingGrip,
            _ => Self::Unknown,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::JoyConLeft => "Joy-Con (L)",
            Self::JoyConRight => "Joy-Con (R)",
            Self::ProController => "Pro Controller",
            Self::ChargingGrip => "Charging Grip",
            Self::Unknown => "Unknown",
        }
    }
}

/// Check if PID belongs to a supported controller
#[inline]
pub fn is_controller_pid(pid: u16) -> bool {
    CONTROLLER_PIDS.contains(&pid)
}
