//! Score channel connection: a thin TCP reader on the score service port.
//!
//! The connection delivers raw tagged-text payloads; parsing and dispatch
//! live in the application layer. One connection per session — when it drops,
//! a `Disconnected` event is emitted exactly once and the task ends. The
//! session orchestrator decides whether to rediscover and reconnect, so this
//! module deliberately has no internal retry loop.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use scorelink_core::protocol::messages::CandidateEndpoint;
use tokio::{io::AsyncReadExt, net::TcpStream, sync::mpsc};
use tracing::{debug, info, warn};

/// Configuration for one score connection.
#[derive(Debug, Clone)]
pub struct ScoreConnectionConfig {
    /// The discovered server endpoint (score service port).
    pub endpoint: CandidateEndpoint,
}

/// Events emitted to the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScoreEvent {
    /// The TCP connection was established.
    Connected,
    /// One inbound text payload (may carry several tagged fields).
    PayloadReceived(String),
    /// The connection ended — cleanly or not, the session is over.
    Disconnected,
}

/// Connects and reads score payloads until the connection or the running
/// flag ends. Returns the event receiver immediately.
pub fn start(
    config: ScoreConnectionConfig,
    running: Arc<AtomicBool>,
) -> mpsc::Receiver<ScoreEvent> {
    let (tx, rx) = mpsc::channel(64);

    tokio::spawn(async move {
        let authority = config.endpoint.authority();
        let mut stream = match TcpStream::connect(&authority).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("score channel connect to {} failed: {e}", config.endpoint);
                let _ = tx.send(ScoreEvent::Disconnected).await;
                return;
            }
        };
        info!("score channel connected to {}", config.endpoint);
        let _ = tx.send(ScoreEvent::Connected).await;

        let mut buf = vec![0u8; 4096];
        while running.load(Ordering::Relaxed) {
            match stream.read(&mut buf).await {
                Ok(0) => {
                    debug!("score channel closed by server");
                    break;
                }
                Ok(n) => {
                    let payload = String::from_utf8_lossy(&buf[..n]).into_owned();
                    if tx.send(ScoreEvent::PayloadReceived(payload)).await.is_err() {
                        return; // consumer gone
                    }
                }
                Err(e) => {
                    warn!("score channel read error: {e}");
                    break;
                }
            }
        }
        let _ = tx.send(ScoreEvent::Disconnected).await;
    });

    rx
}

// ── Tests ─────────────────────────────────────────────────────────────────────
