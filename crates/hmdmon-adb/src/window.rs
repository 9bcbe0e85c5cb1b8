//! Window geometry of mirror processes
//!
//! The mirror window is located by the pid of the spawned process. On Linux
//! this shells out to `xdotool`; other platforms report an unsupported-
//! platform error, which the geometry poll tolerates indefinitely.

use hmdmon_core::prelude::*;
use hmdmon_core::WindowPosition;

/// Host-side window operations the mirror supervisor needs.
#[trait_variant::make(WindowManager: Send)]
pub trait LocalWindowManager {
    /// Geometry of the first visible window owned by `pid`.
    async fn window_position(&self, pid: u32) -> Result<WindowPosition>;

    /// Move/resize the first visible window owned by `pid`.
    async fn set_window_position(&self, pid: u32, position: WindowPosition) -> Result<()>;
}

/// Window manager for the host desktop.
pub struct DesktopWindows;

impl WindowManager for DesktopWindows {
    async fn window_position(&self, pid: u32) -> Result<WindowPosition> {
        platform::window_position(pid).await
    }

    async fn set_window_position(&self, pid: u32, position: WindowPosition) -> Result<()> {
        platform::set_window_position(pid, position).await
    }
}

/// Parse `xdotool getwindowgeometry --shell` output:
/// `WINDOW=…`, `X=…`, `Y=…`, `WIDTH=…`, `HEIGHT=…`, `SCREEN=…` lines.
fn parse_geometry_shell(output: &str) -> Option<WindowPosition> {
    let mut x = None;
    let mut y = None;
    let mut width = None;
    let mut height = None;

    for line in output.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key {
            "X" => x = value.trim().parse::<i32>().ok(),
            "Y" => y = value.trim().parse::<i32>().ok(),
            "WIDTH" => width = value.trim().parse::<u32>().ok(),
            "HEIGHT" => height = value.trim().parse::<u32>().ok(),
            _ => {}
        }
    }

    Some(WindowPosition::new(x?, y?, width?, height?))
}

#[cfg(target_os = "linux")]
mod platform {
    use super::parse_geometry_shell;
    use hmdmon_core::prelude::*;
    use hmdmon_core::WindowPosition;
    use std::process::Stdio;
    use tokio::process::Command;

    async fn xdotool(args: &[String]) -> Result<String> {
        let output = Command::new("xdotool")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::window("xdotool not found. Ensure 'xdotool' is installed.")
                } else {
                    Error::window(format!("failed to run xdotool: {}", e))
                }
            })?;

        // xdotool exits non-zero when a search finds nothing; the caller
        // distinguishes that from real faults by the empty output.
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn first_window_id(pid: u32) -> Result<String> {
        let output = xdotool(&[
            "search".to_string(),
            "--pid".to_string(),
            pid.to_string(),
            "--onlyvisible".to_string(),
        ])
        .await?;

        output
            .lines()
            .next()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or(Error::WindowNotFound { pid })
    }

    pub async fn window_position(pid: u32) -> Result<WindowPosition> {
        let window = first_window_id(pid).await?;
        let output = xdotool(&[
            "getwindowgeometry".to_string(),
            "--shell".to_string(),
            window,
        ])
        .await?;

        parse_geometry_shell(&output)
            .ok_or_else(|| Error::window(format!("unreadable window geometry: {}", output.trim())))
    }

    pub async fn set_window_position(pid: u32, position: WindowPosition) -> Result<()> {
        let window = first_window_id(pid).await?;

        xdotool(&[
            "windowmove".to_string(),
            window.clone(),
            position.x.to_string(),
            position.y.to_string(),
        ])
        .await?;
        xdotool(&[
            "windowsize".to_string(),
            window,
            position.width.to_string(),
            position.height.to_string(),
        ])
        .await?;

        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
mod platform {
    use hmdmon_core::prelude::*;
    use hmdmon_core::WindowPosition;

    pub async fn window_position(_pid: u32) -> Result<WindowPosition> {
        Err(Error::window(
            "window geometry tracking is not supported on this platform",
        ))
    }

    pub async fn set_window_position(_pid: u32, _position: WindowPosition) -> Result<()> {
        Err(Error::window(
            "window geometry tracking is not supported on this platform",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_geometry_shell() {
        let output = "WINDOW=62914566\nX=128\nY=74\nWIDTH=1024\nHEIGHT=768\nSCREEN=0\n";
        assert_eq!(
            parse_geometry_shell(output),
            Some(WindowPosition::new(128, 74, 1024, 768))
        );
    }

    #[test]
    fn test_parse_geometry_shell_negative_coordinates() {
        let output = "WINDOW=1\nX=-12\nY=-3\nWIDTH=640\nHEIGHT=480\nSCREEN=0\n";
        assert_eq!(
            parse_geometry_shell(output),
            Some(WindowPosition::new(-12, -3, 640, 480))
        );
    }

    #[test]
    fn test_parse_geometry_shell_incomplete() {
        assert_eq!(parse_geometry_shell(""), None);
        assert_eq!(parse_geometry_shell("X=10\nY=20\n"), None);
    }
}
