//! App phase polling
//!
//! Samples the phase of the supervised app over its control socket and
//! publishes it on the slot state. A failed sample publishes "unknown"; the
//! app only answers once it is up, so failures are routine.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use hmdmon_adb::PhaseChannel;
use hmdmon_core::prelude::*;

use crate::slot::SlotShared;

/// Cadence of phase samples. The first sample fires immediately.
pub const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Polls the phase of one device until cancelled.
pub async fn run_phase<P>(
    token: CancellationToken,
    channel: Arc<P>,
    shared: Arc<SlotShared>,
    ip: String,
) where
    P: PhaseChannel + Send + Sync + 'static,
{
    debug!("phase polling started for {}", ip);
    let mut tick = tokio::time::interval(POLL_INTERVAL);

    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tick.tick() => {}
        }

        let phase = tokio::select! {
            _ = token.cancelled() => return,
            result = channel.phase(&ip) => match result {
                Ok(phase) => Some(phase),
                Err(e) => {
                    debug!("phase sample for {} failed: {}", ip, e);
                    None
                }
            },
        };
        shared.set_phase(phase);
    }
}
