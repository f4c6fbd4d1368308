//! UDP multicast server discovery.
//!
//! The display broadcasts a `<getServer>{hostname}</getServer>` datagram to
//! the discovery multicast group and collects `<serverIP>ip1,ip2,...</serverIP>`
//! replies. For every qualifying interface an independent UDP socket is bound
//! to that interface and joins the group, so a reply arriving on any one of
//! them is sufficient.
//!
//! Discovery is one-shot per [`ServerDiscoverer::discover`] call: no internal
//! retry or backoff. The caller re-invokes on a timer until a connection
//! succeeds, then calls [`ServerDiscoverer::stop`] — every discovery socket
//! is owned by its listener thread and dropped as soon as the active flag
//! clears, so sockets never outlive the discovery phase.
//!
//! Each listener runs as a blocking thread with a 500 ms read timeout to
//! avoid stalling the Tokio runtime with synchronous socket I/O; on each
//! timeout it checks the active flag and exits cleanly when discovery is
//! stopped.

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use scorelink_core::protocol::messages::{
    discovery_request, parse_discovery_reply, CandidateEndpoint,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::infrastructure::network::interfaces::{qualifying_interfaces, QualifyingInterface};

/// Error type for discovery socket operations.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// A socket could not be bound to the interface address.
    #[error("failed to bind discovery socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// The interface refused the multicast group join.
    #[error("failed to join multicast group on {interface}: {source}")]
    JoinFailed {
        interface: String,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration for a discovery round.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Multicast group the request is sent to.
    pub group: Ipv4Addr,
    /// UDP port the server listens on for discovery requests.
    pub port: u16,
    /// Port carried into each emitted [`CandidateEndpoint`].
    pub service_port: u16,
    /// Scheme used when rendering candidate endpoints as address strings.
    pub scheme: String,
    /// When true, repeated addresses within one `discover()` call are
    /// collapsed; when false every reply address is emitted as received.
    pub dedupe_endpoints: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            group: scorelink_core::protocol::messages::DISCOVERY_GROUP
                .parse()
                .unwrap(),
            port: scorelink_core::protocol::messages::DISCOVERY_PORT,
            service_port: scorelink_core::protocol::messages::SCORE_SERVICE_PORT,
            scheme: "tcp".to_string(),
            dedupe_endpoints: false,
        }
    }
}

/// An event produced when a server reply yields a candidate address.
#[derive(Debug, Clone)]
pub struct DiscoveryEvent {
    /// The server endpoint built from one reply address plus the service port.
    pub endpoint: CandidateEndpoint,
    /// Name of the local interface whose socket received the reply.
    pub interface: String,
    /// Source address of the reply datagram.
    pub server_addr: SocketAddr,
}

/// Broadcasts discovery requests and forwards server replies as events.
pub struct ServerDiscoverer {
    config: DiscoveryConfig,
    host_name: String,
    tx: mpsc::Sender<DiscoveryEvent>,
    active: Arc<AtomicBool>,
}

impl ServerDiscoverer {
    /// Creates a discoverer that emits events on `tx`, advertising the OS
    /// host name.
    pub fn new(config: DiscoveryConfig, tx: mpsc::Sender<DiscoveryEvent>) -> Self {
        let host_name = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "scorelink-display".to_string());
        Self {
            config,
            host_name,
            tx,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replaces the advertised host name (config `display.client_name`).
    pub fn with_host_name(mut self, name: impl Into<String>) -> Self {
        self.host_name = name.into();
        self
    }

    /// Runs one discovery round.
    ///
    /// Returns `false` only when no interfaces qualify. A send failure on one
    /// interface is logged and does not abort discovery on the others.
    pub fn discover(&self) -> bool {
        let interfaces = qualifying_interfaces();
        if interfaces.is_empty() {
            debug!("no qualifying interfaces; discovery not started");
            return false;
        }

        self.active.store(true, Ordering::Relaxed);
        let request = discovery_request(&self.host_name);
        // Seen-set shared by this round's listeners only; a later round
        // starts fresh.
        let seen = Arc::new(Mutex::new(HashSet::new()));

        for iface in interfaces {
            let socket = match self.open_endpoint(&iface) {
                Ok(socket) => socket,
                Err(e) => {
                    warn!("skipping interface {}: {e}", iface.name);
                    continue;
                }
            };

            if let Err(e) = socket.send_to(request.as_bytes(), (self.config.group, self.config.port))
            {
                warn!("discovery send failed on {}: {e}", iface.name);
            } else {
                debug!("discovery request sent on {} ({})", iface.name, iface.ip);
            }

            self.spawn_listener(socket, iface, Arc::clone(&seen));
        }
        true
    }

    /// Stops every listener thread; each drops its socket on the next
    /// timeout tick.
    pub fn stop(&self) {
        self.active.store(false, Ordering::Relaxed);
    }

    /// Binds an independent socket to `iface` and joins the multicast group
    /// on it.
    fn open_endpoint(&self, iface: &QualifyingInterface) -> Result<UdpSocket, DiscoveryError> {
        let bind_addr = SocketAddr::from((iface.ip, 0));
        let socket = UdpSocket::bind(bind_addr).map_err(|source| DiscoveryError::BindFailed {
            addr: bind_addr,
            source,
        })?;
        socket
            .set_read_timeout(Some(Duration::from_millis(500)))
            .ok();
        socket
            .join_multicast_v4(&self.config.group, &iface.ip)
            .map_err(|source| DiscoveryError::JoinFailed {
                interface: iface.name.clone(),
                source,
            })?;
        Ok(socket)
    }

    /// Spawns the blocking listener thread for one discovery socket.
    fn spawn_listener(
        &self,
        socket: UdpSocket,
        iface: QualifyingInterface,
        seen: Arc<Mutex<HashSet<CandidateEndpoint>>>,
    ) {
        let tx = self.tx.clone();
        let active = Arc::clone(&self.active);
        let config = self.config.clone();
        std::thread::Builder::new()
            .name(format!("discovery-{}", iface.name))
            .spawn(move || {
                listener_loop(socket, iface, config, tx, active, seen);
            })
            .expect("failed to spawn discovery listener thread");
    }
}

/// The receive loop executed on each listener thread. The socket is dropped
/// (closed) when the loop exits.
fn listener_loop(
    socket: UdpSocket,
    iface: QualifyingInterface,
    config: DiscoveryConfig,
    tx: mpsc::Sender<DiscoveryEvent>,
    active: Arc<AtomicBool>,
    seen: Arc<Mutex<HashSet<CandidateEndpoint>>>,
) {
    let mut buf = [0u8; 2048];

    while active.load(Ordering::Relaxed) {
        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if is_timeout_error(&e) => continue,
            Err(e) => {
                warn!("discovery recv error on {}: {e}", iface.name);
                break;
            }
        };

        let reply = String::from_utf8_lossy(&buf[..len]);
        let Some(addresses) = parse_discovery_reply(&reply) else {
            debug!("ignoring non-reply datagram from {src} on {}", iface.name);
            continue;
        };

        for address in addresses {
            let endpoint = CandidateEndpoint {
                scheme: config.scheme.clone(),
                host: address,
                port: config.service_port,
            };

            if config.dedupe_endpoints {
                let mut guard = seen.lock().expect("seen set lock poisoned");
                if !guard.insert(endpoint.clone()) {
                    debug!("suppressing duplicate candidate {endpoint}");
                    continue;
                }
            }

            info!("discovered server {endpoint} via {} (reply from {src})", iface.name);
            let event = DiscoveryEvent {
                endpoint,
                interface: iface.name.clone(),
                server_addr: src,
            };
            if tx.blocking_send(event).is_err() {
                // Receiver dropped – discovery consumer is gone.
                return;
            }
        }
    }

    debug!("discovery listener on {} stopped", iface.name);
}

/// Returns `true` for OS timeout / would-block errors that should be retried.
fn is_timeout_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
