//! Node configuration

use std::net::IpAddr;
use std::time::Duration;

use crate::protocol::wire::MAX_FRAME_LEN;

/// Routing-table replication parameter: bucket capacity and the breadth of
/// answers to routing queries.
pub const DEFAULT_K: usize = 20;

/// Well-known overlay port shared by every node in a network.
pub const DEFAULT_PORT: u16 = 60000;

/// Everything a node needs to start.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub port: u16,
    /// Addresses of peers already in the overlay; empty yields an isolated
    /// node that simply waits to be found.
    pub bootstrap_peers: Vec<String>,
    /// Reachable address to bind and advertise; probed from the default
    /// route when absent.
    pub addr: Option<IpAddr>,
    pub k: usize,
    /// Candidate set bound during lookups.
    pub lookup_breadth: usize,
    /// Contacts requested per bucket refresh probe.
    pub refresh_breadth: usize,
    pub connect_timeout: Duration,
    pub hop_timeout: Duration,
    pub lookup_timeout: Duration,
    pub refresh_interval: Duration,
    pub max_refresh_interval: Duration,
    pub stale_after: Duration,
    pub max_frame: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bootstrap_peers: Vec::new(),
            addr: None,
            k: DEFAULT_K,
            lookup_breadth: 20,
            refresh_breadth: 5,
            connect_timeout: Duration::from_secs(2),
            hop_timeout: Duration::from_secs(2),
            lookup_timeout: Duration::from_secs(10),
            refresh_interval: Duration::from_secs(1),
            max_refresh_interval: Duration::from_secs(3600),
            stale_after: Duration::from_secs(3600),
            max_frame: MAX_FRAME_LEN,
        }
    }
}
