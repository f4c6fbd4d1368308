//! Network infrastructure: interface monitoring, server discovery, and the
//! score channel connection.

pub mod discovery;
pub mod interfaces;
pub mod score;

pub use discovery::{DiscoveryConfig, DiscoveryEvent, ServerDiscoverer};
pub use interfaces::{network_available, qualifying_interfaces, QualifyingInterface};
pub use score::{ScoreConnectionConfig, ScoreEvent};
