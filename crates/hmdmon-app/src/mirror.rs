//! Mirror process supervision
//!
//! Keeps exactly one mirror process alive per slot while mirroring is
//! wanted. Crashes restart with a linear backoff capped at five seconds,
//! clean exits restart after a fixed second, and a run that stays up long
//! enough resets the backoff. While a process runs, its window geometry is
//! polled once a second and persisted whenever it changes, so the next
//! launch opens the window where the user left it.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use hmdmon_adb::{MirrorEvent, MirrorHandle, MirrorLauncher, WindowManager};
use hmdmon_core::geometry::WindowPosition;
use hmdmon_core::prelude::*;

use crate::config::SettingsStore;
use crate::slot::SlotShared;

/// Backoff step per consecutive failure.
pub const RESTART_DELAY_STEP: Duration = Duration::from_millis(1000);

/// Backoff ceiling for consecutive failures.
pub const RESTART_DELAY_CAP: Duration = Duration::from_millis(5000);

/// Pause before relaunching after a clean exit.
pub const CLEAN_EXIT_RESTART_DELAY: Duration = Duration::from_millis(1000);

/// A run that stays alive this long counts as healthy and resets the
/// failure counter.
pub const HEALTHY_RUN_THRESHOLD: Duration = Duration::from_millis(1000);

/// Cadence of the window geometry poll.
pub const GEOMETRY_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// What one mirror invocation needs to know.
#[derive(Debug, Clone)]
pub struct MirrorTarget {
    /// Serial keying the persisted config entry.
    pub config_id: String,
    /// Bridge identity the process attaches to, `ip:port`.
    pub target: String,
    /// Extra arguments from the fleet settings, whitespace separated.
    pub extra_args: String,
}

/// Restart delay after `failures` consecutive failed runs.
pub(crate) fn restart_delay(failures: u32) -> Duration {
    RESTART_DELAY_CAP.min(RESTART_DELAY_STEP * failures)
}

/// Argument list for one mirror invocation.
///
/// The persisted window geometry, when present, is passed along so the
/// window reopens where it last stood.
pub fn mirror_args(
    target: &str,
    extra_args: &str,
    position: Option<WindowPosition>,
) -> Vec<String> {
    let mut args = vec!["-s".to_string(), target.to_string()];
    args.extend(extra_args.split_whitespace().map(String::from));
    if let Some(position) = position {
        args.push("--window-x".into());
        args.push(position.x.to_string());
        args.push("--window-y".into());
        args.push(position.y.to_string());
        args.push("--window-width".into());
        args.push(position.width.to_string());
        args.push("--window-height".into());
        args.push(position.height.to_string());
    }
    args
}

enum SessionEnd {
    Exited { code: Option<i32> },
    Cancelled,
}

/// Supervises the mirror process for one slot until cancelled.
pub async fn run_mirror<L, W, S>(
    token: CancellationToken,
    launcher: Arc<L>,
    windows: Arc<W>,
    store: Arc<S>,
    shared: Arc<SlotShared>,
    mirror: MirrorTarget,
) where
    L: MirrorLauncher + Send + Sync + 'static,
    W: WindowManager + Send + Sync + 'static,
    S: SettingsStore + 'static,
{
    info!("mirroring started for {}", mirror.target);
    let mut failures: u32 = 0;

    loop {
        let args = mirror_args(&mirror.target, &mirror.extra_args, shared.last_position());
        let spawned = tokio::select! {
            _ = token.cancelled() => return,
            spawned = launcher.spawn(&args) => spawned,
        };

        let delay = match spawned {
            Err(e) => {
                failures += 1;
                warn!("mirror launch for {} failed: {}", mirror.target, e);
                restart_delay(failures)
            }
            Ok(mut handle) => {
                let started = Instant::now();
                let end =
                    run_session(&token, &mut handle, &*windows, &*store, &shared, &mirror).await;
                match end {
                    SessionEnd::Cancelled => return,
                    SessionEnd::Exited { code } => {
                        if started.elapsed() >= HEALTHY_RUN_THRESHOLD {
                            failures = 0;
                        }
                        if code == Some(0) {
                            debug!("mirror for {} exited cleanly", mirror.target);
                            CLEAN_EXIT_RESTART_DELAY
                        } else {
                            failures += 1;
                            warn!(
                                "mirror for {} died with exit code {:?} ({} consecutive failures)",
                                mirror.target, code, failures
                            );
                            restart_delay(failures)
                        }
                    }
                }
            }
        };

        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// One process lifetime: forward output, poll geometry, wait for the exit.
async fn run_session<W, S>(
    token: &CancellationToken,
    handle: &mut MirrorHandle,
    windows: &W,
    store: &S,
    shared: &SlotShared,
    mirror: &MirrorTarget,
) -> SessionEnd
where
    W: WindowManager + Send + Sync,
    S: SettingsStore + ?Sized,
{
    let mut poll = tokio::time::interval_at(
        Instant::now() + GEOMETRY_POLL_INTERVAL,
        GEOMETRY_POLL_INTERVAL,
    );

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                terminate_and_drain(handle).await;
                return SessionEnd::Cancelled;
            }
            event = handle.next_event() => match event {
                Some(MirrorEvent::Stdout(line)) => info!("[{}] {}", mirror.target, line),
                Some(MirrorEvent::Stderr(line)) => error!("[{}] {}", mirror.target, line),
                Some(MirrorEvent::Exited { code }) => return SessionEnd::Exited { code },
                None => return SessionEnd::Exited { code: None },
            },
            _ = poll.tick() => {
                let Some(pid) = handle.pid() else { continue; };
                let position = tokio::select! {
                    _ = token.cancelled() => {
                        terminate_and_drain(handle).await;
                        return SessionEnd::Cancelled;
                    }
                    position = windows.window_position(pid) => position,
                };
                match position {
                    Ok(position) => {
                        if shared.last_position() != Some(position) {
                            debug!("mirror window for {} moved to {:?}", mirror.target, position);
                            shared.set_last_position(Some(position));
                            persist_position(store, &mirror.config_id, position);
                        }
                    }
                    // Retried on the next tick.
                    Err(e) => trace!("geometry poll for pid {} failed: {}", pid, e),
                }
            }
        }
    }
}

/// Terminates the process and waits until its exit is observed. The next
/// process must never be spawned while this one may still be alive.
async fn terminate_and_drain(handle: &mut MirrorHandle) {
    handle.terminate();
    loop {
        match handle.next_event().await {
            Some(MirrorEvent::Exited { .. }) | None => return,
            Some(_) => {}
        }
    }
}

fn persist_position<S: SettingsStore + ?Sized>(store: &S, id: &str, position: WindowPosition) {
    let mut config = store.device_config(id);
    config.last_window_position = Some(position);
    if let Err(e) = store.set_device_config(&config) {
        warn!("could not persist window geometry for {}: {}", id, e);
    }
}
