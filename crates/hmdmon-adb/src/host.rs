//! Host machine power control

use hmdmon_core::prelude::*;

/// Power the host machine off.
pub fn shutdown_host() -> Result<()> {
    info!("shutting down host");
    system_shutdown::shutdown()
        .map_err(|e| Error::other(format!("failed to shut down host: {}", e)))
}
