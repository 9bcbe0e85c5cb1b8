//! # hmdmon-app - Supervisory Core
//!
//! Keeps a small fleet of headsets usable without anyone touching them:
//! discovers devices through the bridge, walks each one from its cable
//! serial to a network connection, keeps a mirror window open, relaunches
//! the supervised app and samples battery levels.
//!
//! ## Architecture
//!
//! One discovery poller feeds device snapshots to a fixed set of slot
//! supervisors over a watch channel. Each slot derives a link state from
//! the snapshot and edge-triggers its role tasks (reconnect, mirror,
//! keepalive, telemetry, phase) off state transitions. Everything shuts
//! down through a cancellation token hierarchy rooted in [`fleet::Fleet`].
//!
//! ## Public API
//!
//! - [`Fleet`] - Start/stop the whole supervision tree, power everything off
//! - [`SlotCommand`] - Runtime toggles, phase switching, app kill, shutdown
//! - [`SlotShared`] - Observable per-slot state
//! - [`config`] - Persisted fleet and per-device settings

pub mod config;
pub mod discovery;
pub mod fleet;
pub mod mirror;
pub mod phase;
pub mod reconnect;
pub mod slot;
pub mod telemetry;
pub mod watchdog;

#[cfg(test)]
pub(crate) mod testing;

// Public API re-exports
pub use config::{DeviceConfig, FleetSettings, SettingsStore, TomlSettingsStore};
pub use fleet::{Fleet, SlotHandle};
pub use slot::{Advisory, Collaborators, SlotCommand, SlotShared};
