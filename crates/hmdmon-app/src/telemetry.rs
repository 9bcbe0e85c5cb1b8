//! Battery telemetry
//!
//! Samples the battery level of a connected device on a fixed cadence and
//! publishes it on the slot state. A failed sample publishes "unknown"
//! rather than holding on to a stale reading.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use hmdmon_adb::DeviceBridge;
use hmdmon_core::prelude::*;

use crate::slot::SlotShared;

/// Cadence of battery samples. The first sample fires immediately.
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(30);

/// Samples the battery of one device until cancelled.
pub async fn run_telemetry<B>(
    token: CancellationToken,
    bridge: Arc<B>,
    shared: Arc<SlotShared>,
    target: String,
) where
    B: DeviceBridge + Send + Sync + 'static,
{
    debug!("battery telemetry started for {}", target);
    let mut tick = tokio::time::interval(SAMPLE_INTERVAL);

    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tick.tick() => {}
        }

        let level = tokio::select! {
            _ = token.cancelled() => return,
            result = bridge.get_battery_level(&target) => match result {
                Ok(level) => Some(level),
                Err(e) => {
                    debug!("battery sample for {} failed: {}", target, e);
                    None
                }
            },
        };
        shared.set_battery(level);
    }
}
