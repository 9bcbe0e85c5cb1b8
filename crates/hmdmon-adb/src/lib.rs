//! # hmdmon-adb - Device Bridge and Mirror Processes
//!
//! Talks to the outside world on behalf of the supervisory core: the adb
//! device bridge, the scrcpy mirror process, host window geometry and host
//! power control.
//!
//! Depends on [`hmdmon_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Device Bridge
//! - [`DeviceBridge`] - Trait consumed by every supervisor
//! - [`Adb`] - Implementation shelling out to the `adb` binary
//!
//! ### Mirror Processes
//! - [`MirrorLauncher`] - Spawner abstraction
//! - [`Scrcpy`] - scrcpy-backed launcher with per-OS executable selection
//! - [`MirrorHandle`] - Handle to one spawned process (events + termination)
//! - [`MirrorEvent`] - stdout/stderr lines and the final exit
//!
//! ### App Phase
//! - [`PhaseChannel`] - Trait for reading/switching the app's phase
//! - [`TcpPhaseChannel`] - Control socket implementation
//!
//! ### Window Geometry
//! - [`WindowManager`] - Trait for locating/moving the mirror window by pid
//! - [`DesktopWindows`] - Host desktop implementation
//!
//! ### Host Utilities
//! - [`find_adb()`], [`find_scrcpy()`] - Tool lookup
//! - [`ensure_same_network()`] - Subnet membership check
//! - [`shutdown_host()`] - Host power-off

pub mod adb;
pub mod bridge;
pub mod host;
pub mod mirror;
pub mod network;
pub mod phase;
pub mod tools;
pub mod window;

// Public API re-exports
pub use adb::Adb;
pub use bridge::DeviceBridge;
pub use host::shutdown_host;
pub use mirror::{MirrorEvent, MirrorHandle, MirrorLauncher, Scrcpy};
pub use network::{ensure_same_network, same_subnet};
pub use phase::{PhaseChannel, TcpPhaseChannel};
pub use tools::{find_adb, find_scrcpy};
pub use window::{DesktopWindows, WindowManager};
