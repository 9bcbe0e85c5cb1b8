//! Settings persistence
//!
//! All settings live in one TOML file. Reads are forgiving: a missing or
//! unreadable file yields defaults so a fresh install starts supervising
//! immediately. Writes go through an exclusive file lock.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use hmdmon_core::prelude::*;

use super::types::{DeviceConfig, FleetSettings};

/// Read/write access to the persisted settings.
///
/// `device_config` never fails: unknown serials yield a default entry so
/// callers can treat every device as configured.
pub trait SettingsStore: Send + Sync {
    fn fleet_settings(&self) -> FleetSettings;
    fn device_config(&self, id: &str) -> DeviceConfig;
    fn set_device_config(&self, config: &DeviceConfig) -> Result<()>;
}

/// On-disk shape of the settings file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct SettingsFile {
    fleet: FleetSettings,
    devices: BTreeMap<String, DeviceConfig>,
}

impl SettingsFile {
    fn device_config(&self, id: &str) -> DeviceConfig {
        self.devices
            .get(id)
            .cloned()
            .unwrap_or_else(|| DeviceConfig::default_for(id))
    }
}

/// TOML-backed store at a fixed path.
pub struct TomlSettingsStore {
    path: PathBuf,
}

impl TomlSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the platform config dir, e.g. `~/.config/hmdmon/config.toml`.
    pub fn at_default_path() -> Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::config("could not determine the config directory"))?;
        Ok(Self::new(dir.join("hmdmon").join("config.toml")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> SettingsFile {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return SettingsFile::default(),
            Err(e) => {
                warn!("could not read {}: {}", self.path.display(), e);
                return SettingsFile::default();
            }
        };

        match toml::from_str(&content) {
            Ok(file) => file,
            Err(e) => {
                warn!("malformed settings in {}: {}", self.path.display(), e);
                SettingsFile::default()
            }
        }
    }

    fn save(&self, file: &SettingsFile) -> Result<()> {
        let content = toml::to_string_pretty(file)
            .map_err(|e| Error::config(format!("failed to serialize settings: {}", e)))?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::config(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }

        // Exclusive lock for concurrent write protection.
        let mut handle = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| Error::config(format!("failed to open {}: {}", self.path.display(), e)))?;

        handle
            .lock_exclusive()
            .map_err(|e| Error::config(format!("failed to lock {}: {}", self.path.display(), e)))?;

        use std::io::Write;
        handle
            .write_all(content.as_bytes())
            .map_err(|e| Error::config(format!("failed to write {}: {}", self.path.display(), e)))?;
        handle
            .flush()
            .map_err(|e| Error::config(format!("failed to flush {}: {}", self.path.display(), e)))?;

        // Lock is released when the handle drops.
        debug!("saved settings to {}", self.path.display());
        Ok(())
    }
}

impl SettingsStore for TomlSettingsStore {
    fn fleet_settings(&self) -> FleetSettings {
        self.load().fleet
    }

    fn device_config(&self, id: &str) -> DeviceConfig {
        self.load().device_config(id)
    }

    fn set_device_config(&self, config: &DeviceConfig) -> Result<()> {
        let mut file = self.load();
        file.devices.insert(config.id.clone(), config.clone());
        self.save(&file)
    }
}

/// In-memory store for embedding and tests.
#[derive(Default)]
pub struct MemorySettingsStore {
    inner: Mutex<SettingsFile>,
    writes: std::sync::atomic::AtomicUsize,
}

impl MemorySettingsStore {
    pub fn new(fleet: FleetSettings) -> Self {
        Self {
            inner: Mutex::new(SettingsFile {
                fleet,
                devices: BTreeMap::new(),
            }),
            writes: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Number of `set_device_config` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl SettingsStore for MemorySettingsStore {
    fn fleet_settings(&self) -> FleetSettings {
        self.inner.lock().expect("settings lock poisoned").fleet.clone()
    }

    fn device_config(&self, id: &str) -> DeviceConfig {
        self.inner
            .lock()
            .expect("settings lock poisoned")
            .device_config(id)
    }

    fn set_device_config(&self, config: &DeviceConfig) -> Result<()> {
        self.writes
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.inner
            .lock()
            .expect("settings lock poisoned")
            .devices
            .insert(config.id.clone(), config.clone());
        Ok(())
    }
}
