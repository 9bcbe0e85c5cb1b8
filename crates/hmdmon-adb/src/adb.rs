//! adb-backed implementation of the device bridge

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::bridge::DeviceBridge;
use crate::network;
use crate::tools;
use hmdmon_core::prelude::*;
use hmdmon_core::{remote_identifier, ConnectionState, Device};

/// How long the device may drop off the bus while adbd restarts in tcp mode.
const TCPIP_REAPPEAR_ATTEMPTS: u32 = 5;
const TCPIP_REAPPEAR_DELAY: Duration = Duration::from_millis(1000);

/// Broadcast that pulls the headset out of proximity-sensor sleep. Without it
/// the device sometimes gets into a state where launches are ignored.
const PROX_CLOSE_BROADCAST: &str = "am broadcast -a com.oculus.vrpowermanager.prox_close";
const PROX_RESTORE_BROADCAST: &str = "am broadcast -a com.oculus.vrpowermanager.automation_disable";

/// Device bridge backed by the `adb` command line tool.
pub struct Adb {
    path: PathBuf,
}

impl Adb {
    /// Locate the adb binary on PATH (or via `HMDMON_ADB`).
    pub fn locate() -> Result<Self> {
        Ok(Self {
            path: tools::find_adb()?,
        })
    }

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn run_raw(&self, args: &[&str]) -> Result<AdbOutput> {
        let output = Command::new(&self.path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::AdbNotFound
                } else {
                    Error::adb(format!("failed to run adb: {}", e))
                }
            })?;

        Ok(AdbOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    /// Run an adb command, treating a non-zero exit code as an error.
    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = self.run_raw(args).await?;

        if !output.success {
            return Err(Error::adb(format!(
                "adb {} failed with exit code {:?}: {}",
                args.join(" "),
                output.code,
                output.stderr.trim()
            )));
        }

        Ok(output.stdout)
    }

    /// Run a shell command on the device, failing on a non-zero exit code.
    async fn shell(&self, id: &str, command: &str) -> Result<String> {
        self.run(&["-s", id, "shell", command]).await
    }

    /// Run a shell command on the device, keeping stdout regardless of the
    /// exit code. Needed for probes like `pidof` or `grep` whose exit code
    /// encodes "no match" rather than a fault.
    async fn shell_output(&self, id: &str, command: &str) -> Result<String> {
        let output = self.run_raw(&["-s", id, "shell", command]).await?;
        Ok(output.stdout)
    }
}

struct AdbOutput {
    success: bool,
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl DeviceBridge for Adb {
    async fn list_devices(&self) -> Result<Vec<Device>> {
        let output = self.run(&["devices"]).await?;
        Ok(parse_device_list(&output))
    }

    async fn connect(&self, id: &str, port: u16) -> Result<String> {
        let configured_port = self.shell(id, "getprop service.adb.tcp.port").await?;
        debug!("configured tcp port for {}: {}", id, configured_port.trim());

        if configured_port.trim() != port.to_string() {
            let result = self.run(&["-s", id, "tcpip", &port.to_string()]).await?;
            info!("tcpip result: {}", result.trim());

            // adbd restarts in tcp mode and the device drops off the bus for
            // a moment. Wait until it reappears before resolving its ip.
            for _ in 0..TCPIP_REAPPEAR_ATTEMPTS {
                tokio::time::sleep(TCPIP_REAPPEAR_DELAY).await;

                if self
                    .list_devices()
                    .await?
                    .iter()
                    .any(|d| d.identifier == id)
                {
                    break;
                }
            }
        }

        let ip = self.get_ip(id).await?;
        let address: Ipv4Addr = ip
            .parse()
            .map_err(|_| Error::other(format!("invalid device ip: {}", ip)))?;

        network::ensure_same_network(address)?;

        let target = remote_identifier(&ip, port);
        let result = self.run(&["connect", &target]).await?;
        check_connect_output(&result)?;

        Ok(ip)
    }

    async fn connect_to_ip(&self, ip: &str, port: u16) -> Result<()> {
        let target = remote_identifier(ip, port);
        let result = self.run(&["connect", &target]).await?;
        check_connect_output(&result)
    }

    async fn get_ip(&self, id: &str) -> Result<String> {
        let route = self.shell(id, "ip route").await?;
        parse_ip_route(&route).ok_or(Error::NotInANetwork)
    }

    async fn is_running(&self, id: &str, package: &str) -> Result<bool> {
        let command = format!("pidof {}", package);
        let output = self.shell_output(id, &command).await?;
        Ok(!output.trim().is_empty())
    }

    async fn is_screen_on(&self, id: &str) -> Result<bool> {
        let output = self
            .shell_output(id, "dumpsys deviceidle | grep mScreenOn")
            .await?;
        Ok(parse_screen_on(&output))
    }

    async fn launch_app(&self, id: &str, package: &str) -> Result<()> {
        // Wake the device first; failures here are not interesting.
        let _ = self.shell_output(id, PROX_CLOSE_BROADCAST).await;

        let command = format!("monkey -p {} 1", package);
        let result = self.shell(id, &command).await;

        let _ = self.shell_output(id, PROX_RESTORE_BROADCAST).await;

        result.map(|output| {
            debug!("launch result: {}", output.trim());
        })
    }

    async fn kill_app(&self, id: &str, package: &str) -> Result<()> {
        let command = format!("am force-stop {}", package);
        self.shell(id, &command).await?;
        Ok(())
    }

    async fn get_battery_level(&self, id: &str) -> Result<i32> {
        let output = self.shell_output(id, "dumpsys battery | grep level").await?;
        parse_battery_level(&output)
            .ok_or_else(|| Error::protocol(format!("unreadable battery level: {}", output.trim())))
    }

    async fn shutdown_device(&self, id: &str) -> Result<()> {
        self.shell(id, "reboot -p").await?;
        Ok(())
    }

    async fn kill_server(&self) -> Result<()> {
        self.run(&["kill-server"]).await?;
        Ok(())
    }

    async fn shutdown_host(&self) -> Result<()> {
        crate::host::shutdown_host()
    }
}

// ─────────────────────────────────────────────────────────────────
// Output Parsing
// ─────────────────────────────────────────────────────────────────

/// Parse the output of `adb devices` into a discovery snapshot.
///
/// Lines that are not device entries (the banner, daemon start notices,
/// blank lines) are skipped.
fn parse_device_list(output: &str) -> Vec<Device> {
    output
        .lines()
        .skip_while(|line| !line.starts_with("List of devices"))
        .skip(1)
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let identifier = fields.next()?;
            let state = fields.next()?;
            Some(Device::new(identifier, parse_device_state(state)))
        })
        .collect()
}

fn parse_device_state(token: &str) -> ConnectionState {
    match token {
        "device" => ConnectionState::Device,
        "offline" => ConnectionState::Offline,
        "unauthorized" => ConnectionState::Unauthorized,
        "authorizing" => ConnectionState::Authorizing,
        "nodevice" => ConnectionState::NoDevice,
        other => {
            debug!("unknown device state token: {}", other);
            ConnectionState::Offline
        }
    }
}

/// Extract the device's own address from `ip route` output: the ninth
/// whitespace-separated field (`src <addr>`) of the first qualifying line.
fn parse_ip_route(output: &str) -> Option<String> {
    output
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>())
        .find(|fields| fields.len() >= 9)
        .map(|fields| fields[8].to_string())
}

/// `dumpsys deviceidle | grep mScreenOn` yields `  mScreenOn=true`.
fn parse_screen_on(output: &str) -> bool {
    output
        .split_once('=')
        .map(|(_, value)| value.trim() == "true")
        .unwrap_or(false)
}

/// `dumpsys battery | grep level` yields `  level: 87`.
fn parse_battery_level(output: &str) -> Option<i32> {
    output
        .split(':')
        .nth(1)
        .and_then(|number| number.trim().parse::<i32>().ok())
}

/// `adb connect` exits zero even when the connection fails; the outcome is
/// only visible in its output. "already connected" counts as success.
fn check_connect_output(output: &str) -> Result<()> {
    let trimmed = output.trim();

    if trimmed.contains("already connected") {
        return Ok(());
    }

    if trimmed.contains("failed to connect") || trimmed.contains("unable to connect") {
        return Err(Error::adb(trimmed.to_string()));
    }

    Ok(())
}
