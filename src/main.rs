//! hmdmon - Headset fleet supervisor
//!
//! This is the binary entry point. All logic lives in the library crates.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use hmdmon_adb::{Adb, DesktopWindows, DeviceBridge, Scrcpy, TcpPhaseChannel};
use hmdmon_app::{Collaborators, Fleet, TomlSettingsStore};
use hmdmon_core::prelude::*;

/// Keeps a small fleet of headsets connected, mirrored and running.
#[derive(Parser, Debug)]
#[command(name = "hmdmon")]
#[command(about = "Supervises a fleet of headsets over adb", long_about = None)]
struct Args {
    /// Path to the settings file (defaults to the platform config dir)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install().map_err(|e| Error::other(e.to_string()))?;

    let args = Args::parse();

    hmdmon_core::logging::init()?;

    let store = match args.config {
        Some(path) => TomlSettingsStore::new(path),
        None => TomlSettingsStore::at_default_path()?,
    };
    info!("settings file: {}", store.path().display());

    // Fail fast when the external tools are missing; nothing below can work
    // without them.
    let bridge = Arc::new(Adb::locate()?);
    let launcher = Arc::new(Scrcpy::locate()?);

    let fleet = Fleet::start(Collaborators {
        bridge: bridge.clone(),
        launcher,
        windows: Arc::new(DesktopWindows),
        phase: Arc::new(TcpPhaseChannel::new()),
        store: Arc::new(store),
    });

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");
    fleet.shutdown().await;

    // The bridge server holds the tcp links open; stop it so the devices
    // drop back to a clean state.
    if let Err(e) = bridge.kill_server().await {
        warn!("could not stop the bridge server: {}", e);
    }

    Ok(())
}
