//! Mirror (scrcpy) process management

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};

use crate::tools;
use hmdmon_core::prelude::*;

/// Everything a mirror process can tell its supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorEvent {
    /// A line written to stdout. Informational only.
    Stdout(String),
    /// A line written to stderr. Informational only.
    Stderr(String),
    /// The process terminated. Always the last event of a run.
    Exited { code: Option<i32> },
}

/// Handle to one spawned mirror process.
///
/// The `Child` itself is owned by a background wait task that captures the
/// real exit code and emits it as [`MirrorEvent::Exited`]. The handle keeps a
/// kill channel to request termination; the wait task kills and then reaps
/// the child so the exit is always observed through the event stream.
///
/// At most one live handle exists per slot; the mirror supervisor drops it
/// only after seeing `Exited`.
pub struct MirrorHandle {
    pid: Option<u32>,
    events: mpsc::Receiver<MirrorEvent>,
    kill_tx: Option<oneshot::Sender<()>>,
}

impl MirrorHandle {
    /// Assemble a handle from its raw parts. Used by launchers (and tests)
    /// that manage the underlying process themselves.
    pub fn from_parts(
        pid: Option<u32>,
        events: mpsc::Receiver<MirrorEvent>,
        kill_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            pid,
            events,
            kill_tx: Some(kill_tx),
        }
    }

    /// OS process id, if the spawn reported one.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Next event from the process. `None` once the event channel is closed,
    /// which can only happen after `Exited` was sent (or the wait task died).
    pub async fn next_event(&mut self) -> Option<MirrorEvent> {
        self.events.recv().await
    }

    /// Ask the wait task to kill the process. Idempotent; the termination
    /// itself is observed as a regular [`MirrorEvent::Exited`].
    pub fn terminate(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            // The wait task may already be gone if the process exited.
            let _ = tx.send(());
        }
    }
}

impl Drop for MirrorHandle {
    fn drop(&mut self) {
        // Safety net for abnormal teardown; normal deactivation terminates
        // explicitly and waits for the exit event first.
        self.terminate();
    }
}

/// Spawner abstraction so the mirror supervisor can be driven by fakes.
#[trait_variant::make(MirrorLauncher: Send)]
pub trait LocalMirrorLauncher {
    async fn spawn(&self, args: &[String]) -> Result<MirrorHandle>;
}

/// scrcpy-backed mirror launcher.
pub struct Scrcpy {
    path: PathBuf,
}

impl Scrcpy {
    /// Locate the platform's scrcpy variant on PATH (or via `HMDMON_SCRCPY`).
    pub fn locate() -> Result<Self> {
        Ok(Self {
            path: tools::find_scrcpy()?,
        })
    }

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MirrorLauncher for Scrcpy {
    async fn spawn(&self, args: &[String]) -> Result<MirrorHandle> {
        spawn_mirror(&self.path, args)
    }
}

/// Spawn a mirror process and wire up its event stream.
fn spawn_mirror(program: &Path, args: &[String]) -> Result<MirrorHandle> {
    info!("spawning mirror: {} {}", program.display(), args.join(" "));

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true) // Critical: cleanup on drop
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ScrcpyNotFound
            } else {
                Error::process_spawn(e.to_string())
            }
        })?;

    let pid = child.id();
    debug!("mirror process started with pid {:?}", pid);

    let (event_tx, event_rx) = mpsc::channel::<MirrorEvent>(64);

    let stdout = child.stdout.take().expect("stdout was configured");
    tokio::spawn(stdout_reader(stdout, event_tx.clone()));

    let stderr = child.stderr.take().expect("stderr was configured");
    tokio::spawn(stderr_reader(stderr, event_tx.clone()));

    // Kill channel: the handle holds the sender, the wait task the receiver.
    let (kill_tx, kill_rx) = oneshot::channel::<()>();
    tokio::spawn(wait_for_exit(child, kill_rx, event_tx));

    Ok(MirrorHandle::from_parts(pid, event_rx, kill_tx))
}

/// Background task: owns the `Child`, waits for it to exit, emits `Exited`.
///
/// Two ways the task can end:
/// 1. The process exits on its own -- `child.wait()` resolves.
/// 2. `kill_rx` fires -- kill the child first, then reap it.
async fn wait_for_exit(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    event_tx: mpsc::Sender<MirrorEvent>,
) {
    let code: Option<i32> = tokio::select! {
        result = child.wait() => {
            match result {
                Ok(status) => {
                    info!("mirror process exited with status {:?}", status);
                    status.code()
                }
                Err(e) => {
                    error!("error waiting for mirror process: {}", e);
                    None
                }
            }
        }
        _ = kill_rx => {
            debug!("kill signal received, terminating mirror process");
            if let Err(e) = child.kill().await {
                error!("failed to kill mirror process: {}", e);
            }
            match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    error!("error waiting after kill: {}", e);
                    None
                }
            }
        }
    };

    let _ = event_tx.send(MirrorEvent::Exited { code }).await;
}

/// Read lines from stdout and forward them as events.
///
/// Does NOT emit `Exited` -- that is the wait task's job, which captures the
/// real exit code.
async fn stdout_reader(stdout: tokio::process::ChildStdout, tx: mpsc::Sender<MirrorEvent>) {
    let mut reader = BufReader::new(stdout).lines();

    while let Ok(Some(line)) = reader.next_line().await {
        if tx.send(MirrorEvent::Stdout(line)).await.is_err() {
            break;
        }
    }

    debug!("mirror stdout reader finished");
}

async fn stderr_reader(stderr: tokio::process::ChildStderr, tx: mpsc::Sender<MirrorEvent>) {
    let mut reader = BufReader::new(stderr).lines();

    while let Ok(Some(line)) = reader.next_line().await {
        if tx.send(MirrorEvent::Stderr(line)).await.is_err() {
            break;
        }
    }

    debug!("mirror stderr reader finished");
}
