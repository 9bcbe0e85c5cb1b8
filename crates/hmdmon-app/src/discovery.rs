//! Device discovery
//!
//! One background task polls the device bridge and publishes each snapshot
//! on a watch channel. Every slot supervisor holds a receiver and reacts to
//! changes on its own. The poller never terminates on its own: a failed
//! poll is logged and the previous snapshot stays current.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use hmdmon_adb::DeviceBridge;
use hmdmon_core::device::Device;
use hmdmon_core::prelude::*;

/// Delay before the first poll.
pub const INITIAL_DELAY: Duration = Duration::from_millis(1000);

/// Cadence of every poll after the first.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Latest device snapshot as seen by the poller.
pub type DeviceSnapshot = Arc<Vec<Device>>;

/// Starts the discovery poller and hands out the snapshot channel.
pub fn spawn_discovery<B>(
    bridge: Arc<B>,
    token: CancellationToken,
) -> watch::Receiver<DeviceSnapshot>
where
    B: DeviceBridge + Send + Sync + 'static,
{
    let (tx, rx) = watch::channel(DeviceSnapshot::default());
    tokio::spawn(run_discovery(bridge, token, tx));
    rx
}

async fn run_discovery<B>(
    bridge: Arc<B>,
    token: CancellationToken,
    tx: watch::Sender<DeviceSnapshot>,
) where
    B: DeviceBridge + Send + Sync + 'static,
{
    tokio::select! {
        _ = token.cancelled() => return,
        _ = tokio::time::sleep(INITIAL_DELAY) => {}
    }

    let mut tick = tokio::time::interval(POLL_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tick.tick() => {}
        }

        match bridge.list_devices().await {
            Ok(devices) => {
                if tx.send(Arc::new(devices)).is_err() {
                    // All slots are gone.
                    return;
                }
            }
            Err(e) => {
                warn!("device discovery failed: {}", e);
            }
        }
    }
}
