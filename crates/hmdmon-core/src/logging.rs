//! Logging configuration using tracing

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

/// Initialize the logging subsystem
///
/// Logs are written to `~/.local/share/hmdmon/logs/`
/// Log level is controlled by the `HMDMON_LOG` environment variable.
///
/// # Examples
/// ```bash
/// HMDMON_LOG=debug hmdmon
/// HMDMON_LOG=trace hmdmon
/// ```
pub fn init() -> Result<()> {
    let log_dir = get_log_directory()?;
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "hmdmon.log");

    // Default to info, allow override via HMDMON_LOG
    let env_filter = EnvFilter::try_from_env("HMDMON_LOG")
        .unwrap_or_else(|_| EnvFilter::new("hmdmon=info,warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();

    tracing::info!("hmdmon starting, log directory: {}", log_dir.display());

    Ok(())
}

/// Get the log directory path
fn get_log_directory() -> Result<PathBuf> {
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    Ok(base.join("hmdmon").join("logs"))
}
