//! Scriptable stand-ins for the external collaborators
//!
//! Every supervisor is generic over its collaborators, so the timing tests
//! can script bridge responses and process lifetimes and run entirely on
//! the paused test clock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use hmdmon_adb::{DeviceBridge, MirrorEvent, MirrorHandle, MirrorLauncher, PhaseChannel, WindowManager};
use hmdmon_core::device::Device;
use hmdmon_core::geometry::WindowPosition;
use hmdmon_core::phase::AppPhase;
use hmdmon_core::prelude::*;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().expect("fake state lock poisoned")
}

/// Device bridge with scripted responses.
///
/// Result queues are consumed front to back; an empty queue falls back to a
/// benign default so tests only script what they assert on.
pub struct FakeBridge {
    devices: Mutex<Vec<Device>>,
    list_failures: AtomicUsize,
    list_calls: AtomicUsize,
    connect_results: Mutex<VecDeque<Result<String>>>,
    connect_hang: AtomicBool,
    connect_calls: Mutex<Vec<(String, u16)>>,
    connect_times: Mutex<Vec<Instant>>,
    connects_in_flight: AtomicUsize,
    max_connects_in_flight: AtomicUsize,
    connect_to_ip_calls: Mutex<Vec<(String, u16)>>,
    screen_on: Mutex<std::result::Result<bool, String>>,
    screen_query_times: Mutex<Vec<Instant>>,
    running_results: Mutex<VecDeque<Result<bool>>>,
    running_queries: AtomicUsize,
    launched: Mutex<Vec<String>>,
    battery_results: Mutex<VecDeque<Result<i32>>>,
    battery_query_times: Mutex<Vec<Instant>>,
    kills: Mutex<Vec<(String, String)>>,
    shutdowns: Mutex<Vec<String>>,
    host_shutdowns: AtomicUsize,
}

impl FakeBridge {
    pub fn new() -> Self {
        Self {
            devices: Mutex::new(Vec::new()),
            list_failures: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            connect_results: Mutex::new(VecDeque::new()),
            connect_hang: AtomicBool::new(false),
            connect_calls: Mutex::new(Vec::new()),
            connect_times: Mutex::new(Vec::new()),
            connects_in_flight: AtomicUsize::new(0),
            max_connects_in_flight: AtomicUsize::new(0),
            connect_to_ip_calls: Mutex::new(Vec::new()),
            screen_on: Mutex::new(Ok(true)),
            screen_query_times: Mutex::new(Vec::new()),
            running_results: Mutex::new(VecDeque::new()),
            running_queries: AtomicUsize::new(0),
            launched: Mutex::new(Vec::new()),
            battery_results: Mutex::new(VecDeque::new()),
            battery_query_times: Mutex::new(Vec::new()),
            kills: Mutex::new(Vec::new()),
            shutdowns: Mutex::new(Vec::new()),
            host_shutdowns: AtomicUsize::new(0),
        }
    }

    pub fn set_devices(&self, devices: Vec<Device>) {
        *lock(&self.devices) = devices;
    }

    /// Make the next `count` list calls fail.
    pub fn fail_next_lists(&self, count: usize) {
        self.list_failures.store(count, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn push_connect_result(&self, result: Result<String>) {
        lock(&self.connect_results).push_back(result);
    }

    /// Make every connect attempt block forever.
    pub fn hang_connects(&self) {
        self.connect_hang.store(true, Ordering::SeqCst);
    }

    pub fn connect_calls(&self) -> Vec<(String, u16)> {
        lock(&self.connect_calls).clone()
    }

    pub fn connect_times(&self) -> Vec<Instant> {
        lock(&self.connect_times).clone()
    }

    pub fn max_connects_in_flight(&self) -> usize {
        self.max_connects_in_flight.load(Ordering::SeqCst)
    }

    pub fn connect_to_ip_calls(&self) -> Vec<(String, u16)> {
        lock(&self.connect_to_ip_calls).clone()
    }

    pub fn set_screen_on(&self, result: Result<bool>) {
        *lock(&self.screen_on) = result.map_err(|e| e.to_string());
    }

    pub fn screen_query_times(&self) -> Vec<Instant> {
        lock(&self.screen_query_times).clone()
    }

    pub fn push_running_result(&self, result: Result<bool>) {
        lock(&self.running_results).push_back(result);
    }

    pub fn running_query_count(&self) -> usize {
        self.running_queries.load(Ordering::SeqCst)
    }

    pub fn launch_calls(&self) -> Vec<String> {
        lock(&self.launched).clone()
    }

    pub fn push_battery_result(&self, result: Result<i32>) {
        lock(&self.battery_results).push_back(result);
    }

    pub fn battery_query_times(&self) -> Vec<Instant> {
        lock(&self.battery_query_times).clone()
    }

    pub fn kill_calls(&self) -> Vec<(String, String)> {
        lock(&self.kills).clone()
    }

    pub fn shutdown_calls(&self) -> Vec<String> {
        lock(&self.shutdowns).clone()
    }

    pub fn host_shutdown_calls(&self) -> usize {
        self.host_shutdowns.load(Ordering::SeqCst)
    }
}

impl DeviceBridge for FakeBridge {
    async fn list_devices(&self) -> Result<Vec<Device>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.list_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.list_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::adb("scripted list failure"));
        }
        Ok(lock(&self.devices).clone())
    }

    async fn connect(&self, id: &str, port: u16) -> Result<String> {
        lock(&self.connect_calls).push((id.to_string(), port));
        lock(&self.connect_times).push(Instant::now());
        let in_flight = self.connects_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_connects_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);

        if self.connect_hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        tokio::task::yield_now().await;

        let result = lock(&self.connect_results)
            .pop_front()
            .unwrap_or(Ok("10.0.0.1".to_string()));
        self.connects_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn connect_to_ip(&self, ip: &str, port: u16) -> Result<()> {
        lock(&self.connect_to_ip_calls).push((ip.to_string(), port));
        Ok(())
    }

    async fn get_ip(&self, _id: &str) -> Result<String> {
        Ok("10.0.0.1".to_string())
    }

    async fn is_running(&self, _id: &str, _package: &str) -> Result<bool> {
        self.running_queries.fetch_add(1, Ordering::SeqCst);
        lock(&self.running_results).pop_front().unwrap_or(Ok(true))
    }

    async fn is_screen_on(&self, _id: &str) -> Result<bool> {
        lock(&self.screen_query_times).push(Instant::now());
        lock(&self.screen_on)
            .clone()
            .map_err(Error::adb)
    }

    async fn launch_app(&self, _id: &str, package: &str) -> Result<()> {
        lock(&self.launched).push(package.to_string());
        Ok(())
    }

    async fn kill_app(&self, id: &str, package: &str) -> Result<()> {
        lock(&self.kills).push((id.to_string(), package.to_string()));
        Ok(())
    }

    async fn get_battery_level(&self, _id: &str) -> Result<i32> {
        lock(&self.battery_query_times).push(Instant::now());
        lock(&self.battery_results).pop_front().unwrap_or(Ok(100))
    }

    async fn shutdown_device(&self, id: &str) -> Result<()> {
        lock(&self.shutdowns).push(id.to_string());
        Ok(())
    }

    async fn kill_server(&self) -> Result<()> {
        Ok(())
    }

    async fn shutdown_host(&self) -> Result<()> {
        self.host_shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Phase channel with scripted responses.
pub struct FakePhase {
    phase_results: Mutex<VecDeque<Result<AppPhase>>>,
    phase_query_times: Mutex<Vec<Instant>>,
    set_results: Mutex<VecDeque<Result<()>>>,
    set_calls: Mutex<Vec<(String, AppPhase)>>,
}

impl FakePhase {
    pub fn new() -> Self {
        Self {
            phase_results: Mutex::new(VecDeque::new()),
            phase_query_times: Mutex::new(Vec::new()),
            set_results: Mutex::new(VecDeque::new()),
            set_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push_phase_result(&self, result: Result<AppPhase>) {
        lock(&self.phase_results).push_back(result);
    }

    pub fn phase_query_times(&self) -> Vec<Instant> {
        lock(&self.phase_query_times).clone()
    }

    pub fn push_set_result(&self, result: Result<()>) {
        lock(&self.set_results).push_back(result);
    }

    pub fn set_calls(&self) -> Vec<(String, AppPhase)> {
        lock(&self.set_calls).clone()
    }
}

impl PhaseChannel for FakePhase {
    async fn phase(&self, _ip: &str) -> Result<AppPhase> {
        lock(&self.phase_query_times).push(Instant::now());
        lock(&self.phase_results)
            .pop_front()
            .unwrap_or(Ok(AppPhase::Onboarding))
    }

    async fn set_phase(&self, ip: &str, phase: AppPhase) -> Result<()> {
        lock(&self.set_calls).push((ip.to_string(), phase));
        lock(&self.set_results).pop_front().unwrap_or(Ok(()))
    }
}

/// One scripted answer to a spawn call.
pub enum ScriptedSpawn {
    /// The spawn itself fails.
    Fail,
    /// The spawn succeeds and the process behaves as described.
    Run {
        /// How long the process lives before exiting on its own. `None`
        /// means it runs until killed.
        lifetime: Option<Duration>,
        /// Exit code reported when the lifetime elapses.
        exit_code: Option<i32>,
    },
}

impl ScriptedSpawn {
    pub fn fail() -> Self {
        Self::Fail
    }

    pub fn run_for(lifetime: Duration, exit_code: Option<i32>) -> Self {
        Self::Run {
            lifetime: Some(lifetime),
            exit_code,
        }
    }

    pub fn run_until_killed() -> Self {
        Self::Run {
            lifetime: None,
            exit_code: None,
        }
    }
}

/// Mirror launcher with scripted process lifetimes.
///
/// An exhausted script behaves like [`ScriptedSpawn::run_until_killed`].
pub struct FakeLauncher {
    script: Mutex<VecDeque<ScriptedSpawn>>,
    spawn_times: Mutex<Vec<Instant>>,
    spawn_args: Mutex<Vec<Vec<String>>>,
    live: Arc<AtomicUsize>,
    max_live: Arc<AtomicUsize>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            spawn_times: Mutex::new(Vec::new()),
            spawn_args: Mutex::new(Vec::new()),
            live: Arc::new(AtomicUsize::new(0)),
            max_live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn push_script(&self, spawn: ScriptedSpawn) {
        lock(&self.script).push_back(spawn);
    }

    pub fn spawn_times(&self) -> Vec<Instant> {
        lock(&self.spawn_times).clone()
    }

    pub fn spawn_args(&self) -> Vec<Vec<String>> {
        lock(&self.spawn_args).clone()
    }

    /// Number of scripted processes currently alive.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Highest number of processes ever alive at once.
    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }
}

impl MirrorLauncher for FakeLauncher {
    async fn spawn(&self, args: &[String]) -> Result<MirrorHandle> {
        lock(&self.spawn_times).push(Instant::now());
        lock(&self.spawn_args).push(args.to_vec());

        let scripted = lock(&self.script)
            .pop_front()
            .unwrap_or_else(ScriptedSpawn::run_until_killed);
        let (lifetime, exit_code) = match scripted {
            ScriptedSpawn::Fail => return Err(Error::process_spawn("scripted spawn failure")),
            ScriptedSpawn::Run {
                lifetime,
                exit_code,
            } => (lifetime, exit_code),
        };

        let (event_tx, event_rx) = mpsc::channel(8);
        let (kill_tx, kill_rx) = oneshot::channel();

        let live = self.live.clone();
        let max_live = self.max_live.clone();
        let alive = live.fetch_add(1, Ordering::SeqCst) + 1;
        max_live.fetch_max(alive, Ordering::SeqCst);

        tokio::spawn(async move {
            let code = match lifetime {
                Some(lifetime) => tokio::select! {
                    _ = tokio::time::sleep(lifetime) => exit_code,
                    _ = kill_rx => None,
                },
                None => {
                    let _ = kill_rx.await;
                    None
                }
            };
            // Decrement before the exit event so a supervisor that saw the
            // exit also sees the process as gone.
            live.fetch_sub(1, Ordering::SeqCst);
            let _ = event_tx.send(MirrorEvent::Exited { code }).await;
        });

        Ok(MirrorHandle::from_parts(Some(4242), event_rx, kill_tx))
    }
}

/// Window manager reporting one settable position; `None` makes every
/// geometry query fail.
pub struct FakeWindows {
    position: Mutex<Option<WindowPosition>>,
}

impl FakeWindows {
    pub fn new(position: Option<WindowPosition>) -> Self {
        Self {
            position: Mutex::new(position),
        }
    }

    pub fn set_position(&self, position: Option<WindowPosition>) {
        *lock(&self.position) = position;
    }
}

impl WindowManager for FakeWindows {
    async fn window_position(&self, pid: u32) -> Result<WindowPosition> {
        lock(&self.position).ok_or(Error::WindowNotFound { pid })
    }

    async fn set_window_position(&self, _pid: u32, _position: WindowPosition) -> Result<()> {
        Ok(())
    }
}
