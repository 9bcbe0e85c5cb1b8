//! Persisted settings types

use serde::{Deserialize, Serialize};

use hmdmon_core::device::DEFAULT_APP_PACKAGE;
use hmdmon_core::geometry::WindowPosition;

/// Number of managed slots. The serial list is padded to this length so
/// every slot exists even when no device is assigned to it.
pub const SLOT_COUNT: usize = 2;

/// Default TCP port the device bridge listens on once switched to
/// network mode.
pub const DEFAULT_BRIDGE_PORT: u16 = 5555;

/// Everything we remember about one device, keyed by its serial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Cable serial of the device this entry belongs to.
    pub id: String,
    /// Last network address a connection succeeded with.
    pub ip: Option<String>,
    /// Keep a mirror window open while the device is reachable.
    pub keep_mirroring: bool,
    /// Relaunch the app whenever it is found dead with the screen on.
    pub keep_app_running: bool,
    /// App the watchdog supervises on this device.
    pub app_package: String,
    /// Mirror window geometry from the previous session.
    pub last_window_position: Option<WindowPosition>,
}

impl DeviceConfig {
    /// Config for a device we have never seen before.
    pub fn default_for(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            ip: None,
            keep_mirroring: false,
            keep_app_running: false,
            app_package: DEFAULT_APP_PACKAGE.to_string(),
            last_window_position: None,
        }
    }
}

/// Fleet-wide settings shared by all slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetSettings {
    /// Serials assigned to the slots, in slot order.
    pub device_serials: Vec<String>,
    /// Extra arguments appended to every mirror invocation.
    pub mirror_args: String,
    /// Port used for network connections to the devices.
    pub port: u16,
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            device_serials: Vec::new(),
            mirror_args: String::new(),
            port: DEFAULT_BRIDGE_PORT,
        }
    }
}

impl FleetSettings {
    /// The configured serials padded with empty entries up to [`SLOT_COUNT`].
    pub fn padded_serials(&self) -> Vec<String> {
        let mut serials = self.device_serials.clone();
        serials.truncate(SLOT_COUNT);
        serials.resize(SLOT_COUNT, String::new());
        serials
    }
}
