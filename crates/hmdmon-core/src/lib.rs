//! # hmdmon-core - Core Domain Types
//!
//! Foundation crate for hmdmon. Provides device identity, the per-slot
//! connection state machine, window geometry, error handling and logging
//! setup.
//!
//! This crate has **zero internal dependencies** -- it only depends on
//! external crates (serde, thiserror, tracing).
//!
//! ## Public API
//!
//! ### Devices (`device`)
//! - [`Device`] - One entry of a discovery snapshot (identifier + state)
//! - [`ConnectionState`] - Bridge-level state of a device
//! - [`LinkState`] - Derived logical state of a managed slot
//! - [`link_state()`] - Pure mapping from a `(local, remote)` pair to [`LinkState`]
//! - [`normalize_package()`] - Canonical package form (activity part stripped)
//!
//! ### App Phase (`phase`)
//! - [`AppPhase`] - Scene of the supervised app, with its wire tokens
//!
//! ### Geometry (`geometry`)
//! - [`WindowPosition`] - Mirror window geometry with structural equality
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with configuration-problem vs transient classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use hmdmon_core::prelude::*;
//! ```

pub mod device;
pub mod error;
pub mod geometry;
pub mod logging;
pub mod phase;

/// Prelude for common imports used throughout all hmdmon crates
pub mod prelude {
    pub use super::error::{Error, Result, ResultExt};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

// Re-export commonly used types at crate root for convenience
pub use device::{
    find_device, link_state, normalize_package, remote_identifier, shutdown_target,
    ConnectionState, Device, LinkState, DEFAULT_APP_PACKAGE,
};
pub use error::{Error, Result, ResultExt};
pub use geometry::WindowPosition;
pub use phase::AppPhase;
