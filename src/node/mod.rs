//! Node assembly and protocol dispatch
//!
//! A running node is three cooperating tasks over shared state: the accept
//! loop feeding frames into the dispatcher, the dispatcher mutating the
//! routing table and completing lookups, and the bootstrap/refresh loop
//! keeping the table populated. Application lookups run alongside all three.

use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::NodeConfig;
use crate::discovery::{Bootstrapper, RefreshConfig};
use crate::error::Result;
use crate::lookup::{LookupConfig, LookupEngine, PendingResponses};
use crate::protocol::wire::Message;
use crate::protocol::{Cid, Contact};
use crate::routing::RoutingTable;
use crate::transport::{self, TcpEndpoint, TransportConfig};

/// A live overlay node. Dropping it cancels its tasks and releases any
/// pending lookups.
pub struct Node {
    local: Cid,
    local_addr: String,
    table: Arc<RoutingTable>,
    lookups: Arc<LookupEngine>,
    tasks: Vec<JoinHandle<()>>,
}

impl Node {
    /// Self-assign an identity, bind the overlay port, and start the
    /// accept/dispatch and bootstrap/refresh tasks.
    pub async fn start(config: NodeConfig) -> Result<Node> {
        let local = Cid::generate();
        let addr: IpAddr = match config.addr {
            Some(addr) => addr,
            None => transport::probe_local_addr().await?,
        };
        let local_addr = addr.to_string();

        let table = Arc::new(RoutingTable::new(local, config.k));
        let endpoint = Arc::new(TcpEndpoint::new(TransportConfig {
            port: config.port,
            connect_timeout: config.connect_timeout,
            max_frame: config.max_frame,
        }));
        let pending = PendingResponses::new();
        let lookups = Arc::new(LookupEngine::new(
            local,
            local_addr.clone(),
            Arc::clone(&table),
            Arc::clone(&endpoint),
            Arc::clone(&pending),
            LookupConfig {
                breadth: config.lookup_breadth,
                hop_timeout: config.hop_timeout,
                deadline: config.lookup_timeout,
            },
        ));

        let (bound, inbound, accept_task) = endpoint.listen(addr).await?;
        info!(addr = %bound, cid = %local, "node up");

        let dispatch_task = tokio::spawn(dispatch_loop(
            inbound,
            local,
            local_addr.clone(),
            config.k,
            Arc::clone(&table),
            Arc::clone(&endpoint),
            Arc::clone(&pending),
        ));

        let refresher = Bootstrapper::new(
            local,
            local_addr.clone(),
            config.bootstrap_peers,
            Arc::clone(&table),
            Arc::clone(&endpoint),
            Arc::clone(&lookups),
            RefreshConfig {
                breadth: config.refresh_breadth,
                initial_interval: config.refresh_interval,
                max_interval: config.max_refresh_interval,
                stale_after: config.stale_after,
            },
        );
        let refresh_task = tokio::spawn(refresher.run());

        Ok(Node {
            local,
            local_addr,
            table,
            lookups,
            tasks: vec![accept_task, dispatch_task, refresh_task],
        })
    }

    pub fn cid(&self) -> Cid {
        self.local
    }

    pub fn addr(&self) -> &str {
        &self.local_addr
    }

    pub fn routing(&self) -> &RoutingTable {
        &self.table
    }

    /// Iterative closest-node search through the overlay.
    pub async fn lookup(&self, target: &Cid, k: usize) -> Vec<Contact> {
        self.lookups.lookup(target, k).await
    }

    /// Diagnostic view of the non-empty routing buckets.
    pub async fn show_table(&self) -> String {
        self.table.render().await
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Apply the protocol's handling rules to each inbound frame, in arrival
/// order. Reply sends are bounded by the transport's connect timeout, so a
/// dead sender cannot wedge the loop.
async fn dispatch_loop(
    mut inbound: mpsc::Receiver<Message>,
    local: Cid,
    local_addr: String,
    k: usize,
    table: Arc<RoutingTable>,
    endpoint: Arc<TcpEndpoint>,
    pending: Arc<PendingResponses>,
) {
    while let Some(message) = inbound.recv().await {
        match message {
            Message::NodeInfoRequest(sender_addr, sender_cid) => {
                table
                    .insert(Contact::new(sender_cid, sender_addr.clone()))
                    .await;
                endpoint
                    .send(
                        &sender_addr,
                        &Message::NodeInfoResponse(local_addr.clone(), local),
                    )
                    .await;
            }
            Message::NodeInfoResponse(responder_addr, responder_cid) => {
                table
                    .insert(Contact::new(responder_cid, responder_addr))
                    .await;
            }
            Message::ClosestNodesRequest(sender_addr, target, request_id) => {
                let contacts = table.closest(&target, k).await;
                endpoint
                    .send(
                        &sender_addr,
                        &Message::ClosestNodesResponse(request_id, contacts),
                    )
                    .await;
            }
            Message::ClosestNodesResponse(request_id, contacts) => {
                if !pending.complete(request_id, contacts) {
                    debug!(request_id, "response with no waiting lookup");
                }
            }
        }
    }
}
