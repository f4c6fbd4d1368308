//! Network availability: which local interfaces qualify for discovery.
//!
//! An interface qualifies when it is not a loopback device and carries an
//! assigned IPv4 address. Enumeration only returns interfaces that are up
//! with an address, so "up + has address" is implied by presence in the list;
//! multicast capability is verified behaviorally when discovery joins the
//! group on the interface (a failed join logs and skips it).
//!
//! `network_available` is a pure, stateless query. Callers drive it on a
//! fixed poll period and stop polling once it returns true, resuming only
//! when told to recheck (for example after a server disconnect).

use std::net::Ipv4Addr;
use std::time::Duration;

use if_addrs::IfAddr;
use tracing::warn;

/// Fixed period between availability checks while waiting for a network.
pub const NETWORK_POLL_INTERVAL: Duration = Duration::from_millis(3000);

/// One non-loopback IPv4 interface with an assigned address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifyingInterface {
    /// OS interface name (e.g. `eth0`, `wlan0`).
    pub name: String,
    /// The interface's assigned IPv4 address; discovery sockets bind to it.
    pub ip: Ipv4Addr,
}

/// Enumerates every qualifying interface right now.
pub fn qualifying_interfaces() -> Vec<QualifyingInterface> {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(list) => list,
        Err(e) => {
            warn!("interface enumeration failed: {e}");
            return Vec::new();
        }
    };

    interfaces
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .filter_map(|iface| match iface.addr {
            IfAddr::V4(v4) => Some(QualifyingInterface {
                name: iface.name,
                ip: v4.ip,
            }),
            IfAddr::V6(_) => None,
        })
        .collect()
}

/// True iff at least one interface qualifies.
pub fn network_available() -> bool {
    !qualifying_interfaces().is_empty()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
