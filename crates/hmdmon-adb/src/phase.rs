//! Phase control over the app's tcp control socket
//!
//! The supervised app listens on a fixed port of the device's network
//! address and speaks a tiny request/response protocol: `get_phase` answers
//! with the current phase token, `set_phase <token>` answers with `ok`.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use hmdmon_core::phase::AppPhase;
use hmdmon_core::prelude::*;

/// Port the supervised app listens on.
pub const PHASE_PORT: u16 = 1337;

/// Phase operations the supervisory core needs. The concrete implementation
/// is [`TcpPhaseChannel`]; tests substitute their own.
#[trait_variant::make(PhaseChannel: Send)]
pub trait LocalPhaseChannel {
    /// The phase the app at `ip` is currently in.
    async fn phase(&self, ip: &str) -> Result<AppPhase>;

    /// Switch the app at `ip` to `phase`.
    async fn set_phase(&self, ip: &str, phase: AppPhase) -> Result<()>;
}

/// Speaks the control socket protocol over a fresh connection per request.
pub struct TcpPhaseChannel {
    port: u16,
}

impl TcpPhaseChannel {
    pub fn new() -> Self {
        Self { port: PHASE_PORT }
    }

    #[cfg(test)]
    fn with_port(port: u16) -> Self {
        Self { port }
    }

    /// One request/response exchange. Responses fit a single small read.
    async fn exchange(&self, ip: &str, request: &str) -> Result<String> {
        let mut socket = TcpStream::connect((ip, self.port)).await?;
        socket.write_all(request.as_bytes()).await?;

        let mut buffer = [0u8; 128];
        let size = socket.read(&mut buffer).await?;
        String::from_utf8(buffer[..size].to_vec())
            .map_err(|_| Error::protocol("control socket answered with invalid utf-8"))
    }
}

impl Default for TcpPhaseChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseChannel for TcpPhaseChannel {
    async fn phase(&self, ip: &str) -> Result<AppPhase> {
        self.exchange(ip, "get_phase").await?.parse()
    }

    async fn set_phase(&self, ip: &str, phase: AppPhase) -> Result<()> {
        let response = self
            .exchange(ip, &format!("set_phase {}", phase))
            .await?;
        if response == "ok" {
            Ok(())
        } else {
            Err(Error::protocol(response))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// One scripted exchange: assert the request, send the response.
    async fn serve_once(expected: &'static str, response: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buffer = [0u8; 128];
            let size = socket.read(&mut buffer).await.unwrap();
            assert_eq!(&buffer[..size], expected.as_bytes());
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        port
    }

    #[tokio::test]
    async fn test_get_phase_parses_the_response_token() {
        let port = serve_once("get_phase", "Onboarding").await;
        let channel = TcpPhaseChannel::with_port(port);

        let phase = PhaseChannel::phase(&channel, "127.0.0.1").await.unwrap();
        assert_eq!(phase, AppPhase::Onboarding);
    }

    #[tokio::test]
    async fn test_get_phase_rejects_garbled_response() {
        let port = serve_once("get_phase", "garbage").await;
        let channel = TcpPhaseChannel::with_port(port);

        let err = PhaseChannel::phase(&channel, "127.0.0.1").await.unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[tokio::test]
    async fn test_set_phase_sends_the_token_and_accepts_ok() {
        let port = serve_once("set_phase Windup", "ok").await;
        let channel = TcpPhaseChannel::with_port(port);

        PhaseChannel::set_phase(&channel, "127.0.0.1", AppPhase::Windup)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_set_phase_surfaces_a_rejection() {
        let port = serve_once("set_phase Windup", "busy").await;
        let channel = TcpPhaseChannel::with_port(port);

        let err = PhaseChannel::set_phase(&channel, "127.0.0.1", AppPhase::Windup)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("busy"));
    }

    #[tokio::test]
    async fn test_unreachable_socket_is_an_io_error() {
        // Bind and drop so the port is very likely closed.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let channel = TcpPhaseChannel::with_port(port);
        let err = PhaseChannel::phase(&channel, "127.0.0.1").await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
