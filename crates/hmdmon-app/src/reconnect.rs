//! Reconnection supervision
//!
//! Two flavors. The full reconnect loop owns the slot's busy flag and
//! retries the cable-to-network handover until it succeeds or is cancelled.
//! The opportunistic connect fires a single network attempt at a previously
//! known address, without touching the busy flag, so a device that lost its
//! cable link can still come back.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use hmdmon_adb::DeviceBridge;
use hmdmon_core::prelude::*;

use crate::config::SettingsStore;
use crate::slot::SlotShared;

/// Delay between failed connection attempts.
pub const RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Grace period before an opportunistic connect fires.
pub const OPPORTUNISTIC_DELAY: Duration = Duration::from_millis(500);

/// Drives connection attempts for one slot until one succeeds.
///
/// At most one attempt is ever in flight. The busy flag is raised for the
/// duration of each attempt so the slot ignores discovery snapshots taken
/// while the bridge is mid-handover.
pub async fn run_reconnect<B, S>(
    token: CancellationToken,
    bridge: Arc<B>,
    store: Arc<S>,
    shared: Arc<SlotShared>,
    id: String,
    port: u16,
) where
    B: DeviceBridge + Send + Sync + 'static,
    S: SettingsStore + 'static,
{
    info!("reconnection started for {}", id);

    loop {
        shared.set_busy(true);
        let result = tokio::select! {
            _ = token.cancelled() => {
                shared.set_busy(false);
                return;
            }
            result = bridge.connect(&id, port) => result,
        };
        shared.set_busy(false);

        match result {
            Ok(ip) => {
                info!("{} reachable over the network at {}", id, ip);
                shared.set_ip(Some(ip.clone()));
                shared.clear_advisory();
                persist_ip(&*store, &id, &ip);
                return;
            }
            Err(e) => {
                warn!("connection attempt for {} failed: {}", id, e);
                shared.record_advisory(&e);
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(RETRY_DELAY) => {}
                }
            }
        }
    }
}

/// Single network attempt at the slot's last known address.
///
/// Failure only logs: if the device is really there, discovery will pick it
/// up and the regular reconnect takes over.
pub async fn run_opportunistic_connect<B>(
    token: CancellationToken,
    bridge: Arc<B>,
    ip: String,
    port: u16,
) where
    B: DeviceBridge + Send + Sync + 'static,
{
    tokio::select! {
        _ = token.cancelled() => return,
        _ = tokio::time::sleep(OPPORTUNISTIC_DELAY) => {}
    }

    let result = tokio::select! {
        _ = token.cancelled() => return,
        result = bridge.connect_to_ip(&ip, port) => result,
    };

    match result {
        Ok(()) => debug!("opportunistic connect to {} succeeded", ip),
        Err(e) => debug!("opportunistic connect to {} failed: {}", ip, e),
    }
}

fn persist_ip<S: SettingsStore + ?Sized>(store: &S, id: &str, ip: &str) {
    let mut config = store.device_config(id);
    config.ip = Some(ip.to_string());
    if let Err(e) = store.set_device_config(&config) {
        warn!("could not persist address for {}: {}", id, e);
    }
}
