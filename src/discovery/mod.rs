//! Overlay join and bucket refresh
//!
//! Feynman: arriving in a new city, you ask the one person you know to
//! introduce you around. Bootstrap peers are that person. Afterwards the
//! refresh loop keeps wandering every district of the identifier space so
//! no bucket goes quiet without anyone noticing.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info};

use crate::lookup::LookupEngine;
use crate::protocol::wire::Message;
use crate::protocol::{random_cid_in_bucket, Cid};
use crate::routing::RoutingTable;
use crate::transport::TcpEndpoint;

/// Refresh loop tuning knobs.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Contacts requested per bucket probe.
    pub breadth: usize,
    /// Cadence while the overlay is still being learned.
    pub initial_interval: Duration,
    /// Backoff ceiling once passes stop discovering anything.
    pub max_interval: Duration,
    /// Populated buckets are left alone until this much quiet has passed.
    pub stale_after: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            breadth: 5,
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(3600),
            stale_after: Duration::from_secs(3600),
        }
    }
}

/// Joins the overlay through the configured bootstrap peers and keeps every
/// bucket of the routing table populated.
pub struct Bootstrapper {
    local: Cid,
    local_addr: String,
    bootstrap_peers: Vec<String>,
    table: Arc<RoutingTable>,
    endpoint: Arc<TcpEndpoint>,
    lookups: Arc<LookupEngine>,
    config: RefreshConfig,
}

impl Bootstrapper {
    pub fn new(
        local: Cid,
        local_addr: String,
        bootstrap_peers: Vec<String>,
        table: Arc<RoutingTable>,
        endpoint: Arc<TcpEndpoint>,
        lookups: Arc<LookupEngine>,
        config: RefreshConfig,
    ) -> Self {
        // A node must never knock on its own door.
        let bootstrap_peers = bootstrap_peers
            .into_iter()
            .filter(|peer| peer != &local_addr)
            .collect();
        Self {
            local,
            local_addr,
            bootstrap_peers,
            table,
            endpoint,
            lookups,
            config,
        }
    }

    /// Long-running join/refresh loop: an eager first pass, then exponential
    /// backoff whenever a pass stops teaching us anything new.
    pub async fn run(self) {
        if !self.bootstrap_peers.is_empty() {
            info!(peers = self.bootstrap_peers.len(), "joining overlay");
        }
        let mut interval = self.config.initial_interval;
        loop {
            let discovered = self.pass().await;
            if discovered == 0 {
                interval = (interval * 2).min(self.config.max_interval);
            } else {
                debug!(discovered, "refresh pass grew the table");
                interval = self.config.initial_interval;
            }
            sleep(interval).await;
        }
    }

    /// One pass: announce ourselves to the bootstrap peers, then probe every
    /// bucket that wants attention with a lookup for a random CID inside its
    /// range. Returns how many contacts the pass added.
    async fn pass(&self) -> usize {
        for peer in &self.bootstrap_peers {
            self.endpoint
                .send(
                    peer,
                    &Message::NodeInfoRequest(self.local_addr.clone(), self.local),
                )
                .await;
        }

        let mut discovered = 0;
        for index in self.table.stale_buckets(self.config.stale_after).await {
            let target = random_cid_in_bucket(&self.local, index);
            for contact in self.lookups.lookup(&target, self.config.breadth).await {
                if self.table.insert(contact).await {
                    discovered += 1;
                }
            }
            self.table.mark_refreshed(index).await;
        }
        discovered
    }
}
