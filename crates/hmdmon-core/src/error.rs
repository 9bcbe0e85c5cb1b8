//! Application error types with rich context

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ─────────────────────────────────────────────────────────────
    // Bridge/Adb Errors
    // ─────────────────────────────────────────────────────────────
    #[error("adb not found. Ensure 'adb' is in your PATH.")]
    AdbNotFound,

    #[error("adb error: {message}")]
    Adb { message: String },

    #[error("The device does not appear to be connected to a network. Check its Wi-Fi settings and make sure the router is powered on.")]
    NotInANetwork,

    #[error("The device is not in the same network as this machine. Make sure this machine is connected to the same router.")]
    NotInSameNetwork,

    #[error("Unexpected adb output: {message}")]
    Protocol { message: String },

    // ─────────────────────────────────────────────────────────────
    // Mirror Process Errors
    // ─────────────────────────────────────────────────────────────
    #[error("scrcpy not found. Ensure 'scrcpy' is in your PATH.")]
    ScrcpyNotFound,

    #[error("Failed to spawn mirror process: {reason}")]
    ProcessSpawn { reason: String },

    #[error("No window found for pid {pid}")]
    WindowNotFound { pid: u32 },

    #[error("Window manager error: {message}")]
    Window { message: String },

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ─────────────────────────────────────────────────────────────
    // Channel/Communication Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Channel send error: {message}")]
    ChannelSend { message: String },

    #[error("Internal error: {message}")]
    Other { message: String },
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn adb(message: impl Into<String>) -> Self {
        Self::Adb {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn process_spawn(reason: impl Into<String>) -> Self {
        Self::ProcessSpawn {
            reason: reason.into(),
        }
    }

    pub fn window(message: impl Into<String>) -> Self {
        Self::Window {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn channel_send(message: impl Into<String>) -> Self {
        Self::ChannelSend {
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// A configuration problem needs the operator's attention: the advisory
    /// stays visible until the next successful connect, unlike transient
    /// faults which are merely logged.
    pub fn is_configuration_problem(&self) -> bool {
        matches!(self, Error::NotInANetwork | Error::NotInSameNetwork)
    }

    /// Transient faults never alter supervisor state.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Adb { .. } | Error::Io(_) | Error::Protocol { .. } | Error::Other { .. }
        )
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions
// ─────────────────────────────────────────────────────────────────

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", context.into(), err);
            err
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", f(), err);
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = Error::adb("device offline");
        assert_eq!(err.to_string(), "adb error: device offline");

        let err = Error::AdbNotFound;
        assert!(err.to_string().contains("adb not found"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_configuration_problem_classification() {
        assert!(Error::NotInANetwork.is_configuration_problem());
        assert!(Error::NotInSameNetwork.is_configuration_problem());
        assert!(!Error::adb("test").is_configuration_problem());
        assert!(!Error::other("test").is_configuration_problem());
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::adb("test").is_transient());
        assert!(Error::other("test").is_transient());
        assert!(Error::protocol("garbled output").is_transient());
        assert!(!Error::NotInANetwork.is_transient());
        assert!(!Error::NotInSameNetwork.is_transient());
    }

    #[test]
    fn test_error_constructors() {
        let _ = Error::adb("test");
        let _ = Error::protocol("test");
        let _ = Error::process_spawn("test");
        let _ = Error::window("test");
        let _ = Error::config("test");
        let _ = Error::channel_send("test");
        let _ = Error::other("test");
    }
}
