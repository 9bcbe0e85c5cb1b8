//! Settings model and persistence

mod store;
mod types;

pub use store::{MemorySettingsStore, SettingsStore, TomlSettingsStore};
pub use types::{DeviceConfig, FleetSettings, DEFAULT_BRIDGE_PORT, SLOT_COUNT};
