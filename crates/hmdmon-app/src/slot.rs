//! Slot supervision
//!
//! A slot binds one configured device serial to a set of role tasks. The
//! supervisor derives a link state from each discovery snapshot and keeps
//! the roles in sync with it: reconnection while the device is only on the
//! cable, mirroring, keepalive and telemetry once it is reachable over the
//! network. Role activation is edge-triggered; a snapshot that changes
//! nothing restarts nothing.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use hmdmon_adb::{DeviceBridge, MirrorLauncher, PhaseChannel, WindowManager};
use hmdmon_core::device::{
    find_device, link_state, normalize_package, remote_identifier, shutdown_target, Device,
    LinkState,
};
use hmdmon_core::geometry::WindowPosition;
use hmdmon_core::phase::AppPhase;
use hmdmon_core::prelude::*;

use crate::config::{DeviceConfig, FleetSettings, SettingsStore};
use crate::discovery::DeviceSnapshot;
use crate::mirror::{self, MirrorTarget};
use crate::{phase, reconnect, telemetry, watchdog};

/// User-visible note about the slot's last connection failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advisory {
    pub message: String,
    /// True when retrying will not help until the setup changes, e.g. the
    /// host has no usable network.
    pub configuration_problem: bool,
}

impl Advisory {
    pub fn from_error(error: &Error) -> Self {
        Self {
            message: error.to_string(),
            configuration_problem: error.is_configuration_problem(),
        }
    }
}

/// Observable state of one slot, shared between the supervisor, its role
/// tasks and whoever renders status.
#[derive(Default)]
pub struct SlotShared {
    busy: AtomicBool,
    ip: Mutex<Option<String>>,
    battery: Mutex<Option<i32>>,
    phase: Mutex<Option<AppPhase>>,
    advisory: Mutex<Option<Advisory>>,
    last_position: Mutex<Option<WindowPosition>>,
}

fn locked<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    lock.lock().expect("slot state lock poisoned")
}

impl SlotShared {
    /// Whether a connection attempt is currently mid-handover.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub(crate) fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::SeqCst);
    }

    /// Last address a connection succeeded with.
    pub fn ip(&self) -> Option<String> {
        locked(&self.ip).clone()
    }

    pub(crate) fn set_ip(&self, ip: Option<String>) {
        *locked(&self.ip) = ip;
    }

    /// Latest battery sample, `None` while unknown.
    pub fn battery(&self) -> Option<i32> {
        *locked(&self.battery)
    }

    pub(crate) fn set_battery(&self, level: Option<i32>) {
        *locked(&self.battery) = level;
    }

    /// Latest app phase sample, `None` while unknown.
    pub fn phase(&self) -> Option<AppPhase> {
        *locked(&self.phase)
    }

    pub(crate) fn set_phase(&self, phase: Option<AppPhase>) {
        *locked(&self.phase) = phase;
    }

    pub fn advisory(&self) -> Option<Advisory> {
        locked(&self.advisory).clone()
    }

    pub(crate) fn record_advisory(&self, error: &Error) {
        *locked(&self.advisory) = Some(Advisory::from_error(error));
    }

    pub(crate) fn clear_advisory(&self) {
        *locked(&self.advisory) = None;
    }

    /// Mirror window geometry from the current or a previous session.
    pub fn last_position(&self) -> Option<WindowPosition> {
        *locked(&self.last_position)
    }

    pub(crate) fn set_last_position(&self, position: Option<WindowPosition>) {
        *locked(&self.last_position) = position;
    }
}

/// Requests a slot accepts at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotCommand {
    SetMirroring(bool),
    SetKeepAppRunning(bool),
    SetPhase(AppPhase),
    KillApp,
    ShutdownDevice,
}

/// The external collaborators every slot works against.
pub struct Collaborators<B, L, W, P, S> {
    pub bridge: Arc<B>,
    pub launcher: Arc<L>,
    pub windows: Arc<W>,
    pub phase: Arc<P>,
    pub store: Arc<S>,
}

impl<B, L, W, P, S> Clone for Collaborators<B, L, W, P, S> {
    fn clone(&self) -> Self {
        Self {
            bridge: Arc::clone(&self.bridge),
            launcher: Arc::clone(&self.launcher),
            windows: Arc::clone(&self.windows),
            phase: Arc::clone(&self.phase),
            store: Arc::clone(&self.store),
        }
    }
}

/// One running role task, cancelled as a unit.
struct RoleTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl RoleTask {
    fn spawn<F, Fut>(parent: &CancellationToken, make: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = parent.child_token();
        let handle = tokio::spawn(make(token.clone()));
        Self { token, handle }
    }

    /// Cancels the task and waits until it is gone. The successor of a role
    /// must never start while its predecessor can still act.
    async fn cancel(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            if !e.is_cancelled() {
                warn!("slot role task panicked: {}", e);
            }
        }
    }
}

type DevicePair = (Option<Device>, Option<Device>);

/// Supervisor for one slot.
pub struct SlotSupervisor<B, L, W, P, S> {
    slot: usize,
    local_id: String,
    port: u16,
    app_package: String,
    extra_mirror_args: String,
    mirroring_enabled: bool,
    keep_app_running: bool,
    shared: Arc<SlotShared>,
    collab: Collaborators<B, L, W, P, S>,
    token: CancellationToken,
    state: LinkState,
    last_pair: Option<DevicePair>,
    commands_closed: bool,
    reconnect: Option<RoleTask>,
    opportunistic: Option<RoleTask>,
    mirror: Option<RoleTask>,
    watchdog: Option<RoleTask>,
    telemetry: Option<RoleTask>,
    phase: Option<RoleTask>,
}

impl<B, L, W, P, S> SlotSupervisor<B, L, W, P, S>
where
    B: DeviceBridge + Send + Sync + 'static,
    L: MirrorLauncher + Send + Sync + 'static,
    W: WindowManager + Send + Sync + 'static,
    P: PhaseChannel + Send + Sync + 'static,
    S: SettingsStore + 'static,
{
    pub fn new(
        slot: usize,
        config: DeviceConfig,
        fleet: &FleetSettings,
        collab: Collaborators<B, L, W, P, S>,
        token: CancellationToken,
    ) -> (Self, Arc<SlotShared>) {
        let shared = Arc::new(SlotShared::default());
        shared.set_ip(config.ip.clone());
        shared.set_last_position(config.last_window_position);

        let supervisor = Self {
            slot,
            local_id: config.id,
            port: fleet.port,
            app_package: config.app_package,
            extra_mirror_args: fleet.mirror_args.clone(),
            mirroring_enabled: config.keep_mirroring,
            keep_app_running: config.keep_app_running,
            shared: shared.clone(),
            collab,
            token,
            state: LinkState::WaitingForDevice,
            last_pair: None,
            commands_closed: false,
            reconnect: None,
            opportunistic: None,
            mirror: None,
            watchdog: None,
            telemetry: None,
            phase: None,
        };
        (supervisor, shared)
    }

    /// Runs the slot until cancelled or the discovery channel closes.
    pub async fn run(
        mut self,
        mut devices: watch::Receiver<DeviceSnapshot>,
        mut commands: mpsc::Receiver<SlotCommand>,
    ) {
        info!("slot {} supervising {:?}", self.slot, self.local_id);

        // Evaluate once before the first snapshot: a stored address may
        // already warrant an opportunistic connect.
        self.apply_pair((None, None)).await;

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                command = commands.recv(), if !self.commands_closed => match command {
                    Some(command) => self.handle_command(command).await,
                    None => self.commands_closed = true,
                },
                changed = devices.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = devices.borrow_and_update().clone();
                    if self.shared.is_busy() {
                        // Mid-handover the bridge reports transient states.
                        continue;
                    }
                    let pair = self.extract_pair(&snapshot);
                    if self.last_pair.as_ref() == Some(&pair) {
                        continue;
                    }
                    self.apply_pair(pair).await;
                }
            }
        }

        self.teardown().await;
    }

    fn extract_pair(&self, devices: &[Device]) -> DevicePair {
        let local = find_device(devices, &self.local_id).cloned();
        let remote = self
            .shared
            .ip()
            .map(|ip| remote_identifier(&ip, self.port))
            .and_then(|id| find_device(devices, &id).cloned());
        (local, remote)
    }

    async fn apply_pair(&mut self, pair: DevicePair) {
        let state = link_state(pair.0.as_ref(), pair.1.as_ref());
        if state != self.state {
            info!(
                "slot {} ({:?}): {:?} -> {:?}",
                self.slot, self.local_id, self.state, state
            );
        }
        self.state = state;
        self.last_pair = Some(pair);
        self.sync_roles().await;
    }

    async fn handle_command(&mut self, command: SlotCommand) {
        match command {
            SlotCommand::SetMirroring(enabled) => {
                if self.mirroring_enabled == enabled {
                    return;
                }
                self.mirroring_enabled = enabled;
                self.persist_flags();
            }
            SlotCommand::SetKeepAppRunning(enabled) => {
                if self.keep_app_running == enabled {
                    return;
                }
                self.keep_app_running = enabled;
                self.persist_flags();
            }
            SlotCommand::SetPhase(phase) => {
                self.switch_phase(phase).await;
                return;
            }
            SlotCommand::KillApp => {
                self.kill_app().await;
                return;
            }
            SlotCommand::ShutdownDevice => {
                self.shutdown_device().await;
                return;
            }
        }
        self.sync_roles().await;
    }

    async fn switch_phase(&self, phase: AppPhase) {
        let Some(ip) = self.shared.ip() else {
            warn!(
                "slot {}: phase change requested without a known address",
                self.slot
            );
            return;
        };
        info!("slot {}: switching {} to {}", self.slot, ip, phase);
        match self.collab.phase.set_phase(&ip, phase).await {
            Ok(()) => self.shared.set_phase(Some(phase)),
            Err(e) => warn!("slot {}: phase change failed: {}", self.slot, e),
        }
    }

    async fn kill_app(&self) {
        let Some(target) = self.shared.ip().map(|ip| remote_identifier(&ip, self.port)) else {
            warn!(
                "slot {}: force-stop requested without a known address",
                self.slot
            );
            return;
        };
        let package = normalize_package(&self.app_package);
        info!(
            "slot {}: force-stopping {} on {}",
            self.slot, package, target
        );
        if let Err(e) = self.collab.bridge.kill_app(&target, package).await {
            warn!("slot {}: force-stop failed: {}", self.slot, e);
        }
    }

    async fn shutdown_device(&self) {
        let pair = self.last_pair.clone().unwrap_or_default();
        // Only a fully connected identity accepts the command; the network
        // one outlives the cable one when both qualify.
        let Some(target) = shutdown_target(pair.0.as_ref(), pair.1.as_ref()) else {
            warn!(
                "slot {}: shutdown requested but no powered device is present",
                self.slot
            );
            return;
        };
        info!("slot {}: shutting down {}", self.slot, target);
        if let Err(e) = self.collab.bridge.shutdown_device(target).await {
            warn!("slot {}: device shutdown failed: {}", self.slot, e);
        }
    }

    fn persist_flags(&self) {
        let mut config = self.collab.store.device_config(&self.local_id);
        config.keep_mirroring = self.mirroring_enabled;
        config.keep_app_running = self.keep_app_running;
        if let Err(e) = self.collab.store.set_device_config(&config) {
            warn!("slot {}: could not persist settings: {}", self.slot, e);
        }
    }

    /// Brings the role tasks in line with the current link state. Each role
    /// is edge-triggered: it is only started or stopped when its predicate
    /// flips.
    async fn sync_roles(&mut self) {
        let pair = self.last_pair.clone().unwrap_or_default();
        let vacant = pair.0.is_none() && pair.1.is_none();
        let ready = self.state == LinkState::Ready;
        let ip = self.shared.ip();
        let remote_id = ip
            .as_deref()
            .map(|ip| remote_identifier(ip, self.port));

        let want_reconnect = self.state == LinkState::WaitingForRemoteConnection;
        if want_reconnect != self.reconnect.is_some() {
            if let Some(task) = self.reconnect.take() {
                task.cancel().await;
            }
            if want_reconnect {
                let bridge = self.collab.bridge.clone();
                let store = self.collab.store.clone();
                let shared = self.shared.clone();
                let id = self.local_id.clone();
                let port = self.port;
                self.reconnect = Some(RoleTask::spawn(&self.token, move |token| {
                    reconnect::run_reconnect(token, bridge, store, shared, id, port)
                }));
            }
        }

        // A device that is off the cable and not yet on the network may
        // still answer at its old address.
        let want_opportunistic = vacant && ip.is_some();
        if want_opportunistic != self.opportunistic.is_some() {
            if let Some(task) = self.opportunistic.take() {
                task.cancel().await;
            }
            if want_opportunistic {
                let bridge = self.collab.bridge.clone();
                let ip = ip.clone().unwrap_or_default();
                let port = self.port;
                self.opportunistic = Some(RoleTask::spawn(&self.token, move |token| {
                    reconnect::run_opportunistic_connect(token, bridge, ip, port)
                }));
            }
        }

        let want_mirror = ready && self.mirroring_enabled && remote_id.is_some();
        if want_mirror != self.mirror.is_some() {
            if let Some(task) = self.mirror.take() {
                task.cancel().await;
            }
            if want_mirror {
                let launcher = self.collab.launcher.clone();
                let windows = self.collab.windows.clone();
                let store = self.collab.store.clone();
                let shared = self.shared.clone();
                let target = MirrorTarget {
                    config_id: self.local_id.clone(),
                    target: remote_id.clone().unwrap_or_default(),
                    extra_args: self.extra_mirror_args.clone(),
                };
                self.mirror = Some(RoleTask::spawn(&self.token, move |token| {
                    mirror::run_mirror(token, launcher, windows, store, shared, target)
                }));
            }
        }

        let want_watchdog = ready && self.keep_app_running && remote_id.is_some();
        if want_watchdog != self.watchdog.is_some() {
            if let Some(task) = self.watchdog.take() {
                task.cancel().await;
            }
            if want_watchdog {
                let bridge = self.collab.bridge.clone();
                let target = remote_id.clone().unwrap_or_default();
                let package = self.app_package.clone();
                self.watchdog = Some(RoleTask::spawn(&self.token, move |token| {
                    watchdog::run_watchdog(token, bridge, target, package)
                }));
            }
        }

        let want_telemetry = ready && remote_id.is_some();
        if want_telemetry != self.telemetry.is_some() {
            if let Some(task) = self.telemetry.take() {
                task.cancel().await;
            }
            if want_telemetry {
                let bridge = self.collab.bridge.clone();
                let shared = self.shared.clone();
                let target = remote_id.clone().unwrap_or_default();
                self.telemetry = Some(RoleTask::spawn(&self.token, move |token| {
                    telemetry::run_telemetry(token, bridge, shared, target)
                }));
            } else {
                self.shared.set_battery(None);
            }
        }

        let want_phase = ready && ip.is_some();
        if want_phase != self.phase.is_some() {
            if let Some(task) = self.phase.take() {
                task.cancel().await;
            }
            if want_phase {
                let channel = self.collab.phase.clone();
                let shared = self.shared.clone();
                let ip = ip.clone().unwrap_or_default();
                self.phase = Some(RoleTask::spawn(&self.token, move |token| {
                    phase::run_phase(token, channel, shared, ip)
                }));
            } else {
                self.shared.set_phase(None);
            }
        }
    }

    async fn teardown(&mut self) {
        for task in [
            self.reconnect.take(),
            self.opportunistic.take(),
            self.mirror.take(),
            self.watchdog.take(),
            self.telemetry.take(),
            self.phase.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.cancel().await;
        }
        debug!("slot {} stopped", self.slot);
    }
}
