//! The device bridge consumed by every supervisor

use hmdmon_core::prelude::*;
use hmdmon_core::Device;

/// Operations the supervisory core needs from the device bridge.
///
/// All calls are asynchronous and must not block the scheduler. The concrete
/// implementation is [`crate::Adb`]; tests substitute their own.
#[trait_variant::make(DeviceBridge: Send)]
pub trait LocalDeviceBridge {
    /// Full list of devices currently known to the bridge.
    async fn list_devices(&self) -> Result<Vec<Device>>;

    /// Establish a network link to the device behind `id`, switching it to
    /// tcp mode if necessary. Returns the device ip on success.
    async fn connect(&self, id: &str, port: u16) -> Result<String>;

    /// Lightweight connect attempt toward a known address. Does not resolve
    /// the ip or reconfigure the device.
    async fn connect_to_ip(&self, ip: &str, port: u16) -> Result<()>;

    /// The ip address of the device's active network interface.
    async fn get_ip(&self, id: &str) -> Result<String>;

    /// Whether a process of `package` is currently running on the device.
    async fn is_running(&self, id: &str, package: &str) -> Result<bool>;

    /// Whether the device's screen is currently on.
    async fn is_screen_on(&self, id: &str) -> Result<bool>;

    /// Launch `package` on the device.
    async fn launch_app(&self, id: &str, package: &str) -> Result<()>;

    /// Force-stop `package` on the device.
    async fn kill_app(&self, id: &str, package: &str) -> Result<()>;

    /// Battery charge level in percent.
    async fn get_battery_level(&self, id: &str) -> Result<i32>;

    /// Power the device off.
    async fn shutdown_device(&self, id: &str) -> Result<()>;

    /// Stop the bridge server itself.
    async fn kill_server(&self) -> Result<()>;

    /// Power the host machine off.
    async fn shutdown_host(&self) -> Result<()>;
}
