//! Device identity and the per-slot connection state machine

use serde::{Deserialize, Serialize};

/// Package launched on the device when no per-device override is configured.
pub const DEFAULT_APP_PACKAGE: &str = "com.oculus.vrshell";

/// Connection state reported by the device bridge for a single device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// The device is not connected to the bridge or is not responding.
    Offline,
    /// The device is connected and operational. Note that the device reaches
    /// this state while the system may still be booting.
    Device,
    /// There is no device connected.
    NoDevice,
    /// Device is being authorized.
    Authorizing,
    /// The device refused authorization.
    Unauthorized,
}

/// A device as it appears in one discovery snapshot. Immutable value,
/// produced fresh on every poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Unique device identifier (usb serial or `ip:port` for network links).
    pub identifier: String,
    /// Connection state of the device.
    pub state: ConnectionState,
}

impl Device {
    pub fn new(identifier: impl Into<String>, state: ConnectionState) -> Self {
        Self {
            identifier: identifier.into(),
            state,
        }
    }
}

/// Logical state of a managed slot, derived from the discovery snapshot.
///
/// Never stored: recomputed from the `(local, remote)` device pair on every
/// discovery tick via [`link_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// The device is not visible over usb and no network link exists.
    WaitingForDevice,
    /// The device is visible but not yet authorized.
    Authorizing,
    /// The device is authorized over usb; the network link is not up yet.
    WaitingForRemoteConnection,
    /// The network link is established.
    Ready,
}

/// Pure, total mapping from the `(local, remote)` device pair to the slot's
/// logical state. A ready remote link wins over whatever the usb side says.
pub fn link_state(local: Option<&Device>, remote: Option<&Device>) -> LinkState {
    if let Some(remote) = remote {
        if remote.state == ConnectionState::Device {
            return LinkState::Ready;
        }
    }

    match local.map(|d| d.state) {
        None | Some(ConnectionState::NoDevice) | Some(ConnectionState::Offline) => {
            LinkState::WaitingForDevice
        }
        Some(ConnectionState::Authorizing) | Some(ConnectionState::Unauthorized) => {
            LinkState::Authorizing
        }
        Some(ConnectionState::Device) => LinkState::WaitingForRemoteConnection,
    }
}

/// Find a device by exact identifier in a discovery snapshot.
pub fn find_device<'a>(devices: &'a [Device], identifier: &str) -> Option<&'a Device> {
    devices.iter().find(|d| d.identifier == identifier)
}

/// The identifier a network-linked device appears under in the device list.
pub fn remote_identifier(ip: &str, port: u16) -> String {
    format!("{}:{}", ip, port)
}

/// The identifier to power a slot's device off through. Only a device that
/// is fully connected accepts the command; the network identity wins when
/// both sides qualify.
pub fn shutdown_target<'a>(
    local: Option<&'a Device>,
    remote: Option<&'a Device>,
) -> Option<&'a str> {
    [remote, local]
        .into_iter()
        .flatten()
        .find(|device| device.state == ConnectionState::Device)
        .map(|device| device.identifier.as_str())
}

/// Canonical package form: everything from the first `/` (the activity part)
/// is stripped. Applied uniformly to both the running check and the launch.
pub fn normalize_package(package: &str) -> &str {
    match package.find('/') {
        Some(idx) => &package[..idx],
        None => package,
    }
}
