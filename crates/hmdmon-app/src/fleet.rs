//! Fleet wiring
//!
//! Starts the discovery poller and one supervisor per configured slot,
//! hands out command channels and shared state, and tears everything down
//! through a single cancellation token.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use hmdmon_adb::{DeviceBridge, MirrorLauncher, PhaseChannel, WindowManager};
use hmdmon_core::device::{find_device, remote_identifier, shutdown_target};
use hmdmon_core::prelude::*;

use crate::config::SettingsStore;
use crate::discovery::{self, DeviceSnapshot};
use crate::slot::{Collaborators, SlotCommand, SlotShared, SlotSupervisor};

/// External face of one running slot.
pub struct SlotHandle {
    /// Serial this slot supervises, empty for an unassigned slot.
    pub local_id: String,
    /// Observable slot state.
    pub shared: Arc<SlotShared>,
    commands: mpsc::Sender<SlotCommand>,
    handle: JoinHandle<()>,
}

impl SlotHandle {
    /// Send a command to the slot. Fails only when the slot is gone.
    pub async fn send(&self, command: SlotCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|e| Error::channel_send(e.to_string()))
    }
}

/// All running slots plus the discovery poller.
pub struct Fleet<B> {
    token: CancellationToken,
    slots: Vec<SlotHandle>,
    bridge: Arc<B>,
    devices: watch::Receiver<DeviceSnapshot>,
    port: u16,
}

impl<B> Fleet<B>
where
    B: DeviceBridge + Send + Sync + 'static,
{
    /// Starts discovery and one supervisor per configured slot.
    pub fn start<L, W, P, S>(collab: Collaborators<B, L, W, P, S>) -> Self
    where
        L: MirrorLauncher + Send + Sync + 'static,
        W: WindowManager + Send + Sync + 'static,
        P: PhaseChannel + Send + Sync + 'static,
        S: SettingsStore + 'static,
    {
        let token = CancellationToken::new();
        let fleet_settings = collab.store.fleet_settings();
        let bridge = collab.bridge.clone();
        let devices = discovery::spawn_discovery(collab.bridge.clone(), token.child_token());

        let mut slots = Vec::new();
        for (index, serial) in fleet_settings.padded_serials().into_iter().enumerate() {
            let config = collab.store.device_config(&serial);
            let (commands, commands_rx) = mpsc::channel(8);
            let (supervisor, shared) = SlotSupervisor::new(
                index,
                config,
                &fleet_settings,
                collab.clone(),
                token.child_token(),
            );
            let handle = tokio::spawn(supervisor.run(devices.clone(), commands_rx));
            slots.push(SlotHandle {
                local_id: serial,
                shared,
                commands,
                handle,
            });
        }

        info!("fleet started with {} slots", slots.len());
        Self {
            token,
            slots,
            bridge,
            devices,
            port: fleet_settings.port,
        }
    }

    pub fn slots(&self) -> &[SlotHandle] {
        &self.slots
    }

    /// Cancels every slot and waits until all of them have torn down their
    /// role tasks and processes.
    pub async fn shutdown(mut self) {
        info!("fleet shutting down");
        self.join_slots().await;
    }

    /// Powers the whole installation off: tears down all slots, then shuts
    /// every reachable device down, then the host itself. Device failures
    /// are logged and do not stop the sequence.
    pub async fn shutdown_all(mut self) {
        info!("fleet powering off devices and host");
        self.join_slots().await;

        let snapshot = self.devices.borrow().clone();
        for slot in &self.slots {
            let local = find_device(&snapshot, &slot.local_id);
            let remote = slot
                .shared
                .ip()
                .map(|ip| remote_identifier(&ip, self.port))
                .and_then(|id| find_device(&snapshot, &id).cloned());
            let Some(target) = shutdown_target(local, remote.as_ref()) else {
                debug!("slot {:?}: no powered device to shut down", slot.local_id);
                continue;
            };
            if let Err(e) = self.bridge.shutdown_device(target).await {
                warn!("could not shut down {}: {}", target, e);
            }
        }

        if let Err(e) = self.bridge.shutdown_host().await {
            warn!("could not shut down the host: {}", e);
        }
    }

    async fn join_slots(&mut self) {
        self.token.cancel();
        for slot in &mut self.slots {
            if let Err(e) = (&mut slot.handle).await {
                if !e.is_cancelled() {
                    warn!("slot task panicked during shutdown: {}", e);
                }
            }
        }
    }
}
