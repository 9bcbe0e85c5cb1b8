//! Locating the external adb and scrcpy binaries

use std::path::PathBuf;

use hmdmon_core::prelude::*;

/// Platform executable variant for adb.
pub fn adb_executable() -> &'static str {
    if cfg!(windows) {
        "adb.exe"
    } else {
        "adb"
    }
}

/// Platform executable variant for scrcpy.
pub fn scrcpy_executable() -> &'static str {
    if cfg!(windows) {
        "scrcpy.exe"
    } else {
        "scrcpy"
    }
}

/// Locate adb: `HMDMON_ADB` override, then PATH, then the bundled tools dir.
pub fn find_adb() -> Result<PathBuf> {
    find_tool("adb", adb_executable(), "HMDMON_ADB").ok_or(Error::AdbNotFound)
}

/// Locate scrcpy: `HMDMON_SCRCPY` override, then PATH, then the bundled
/// tools dir.
pub fn find_scrcpy() -> Result<PathBuf> {
    find_tool("scrcpy", scrcpy_executable(), "HMDMON_SCRCPY").ok_or(Error::ScrcpyNotFound)
}

fn find_tool(name: &str, variant: &str, env_override: &str) -> Option<PathBuf> {
    if let Ok(path) = std::env::var(env_override) {
        let path = PathBuf::from(path);
        if path.exists() {
            debug!("using {} from {}: {}", name, env_override, path.display());
            return Some(path);
        }
        warn!(
            "{} points to a nonexistent path: {}",
            env_override,
            path.display()
        );
    }

    if let Ok(path) = which::which(name) {
        debug!("found {} on PATH: {}", name, path.display());
        return Some(path);
    }

    // Installations that ship the tools next to the hmdmon binary.
    let bundled = std::env::current_exe()
        .ok()?
        .parent()?
        .join("tools")
        .join(variant);

    if bundled.exists() {
        debug!("using bundled {}: {}", name, bundled.display());
        return Some(bundled);
    }

    None
}
