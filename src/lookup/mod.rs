//! Iterative closest-node search
//!
//! Feynman: a lookup is a game of hot-and-cold. Ask the warmest peer you
//! know for peers even warmer, walk toward whoever they name, and stop the
//! moment nobody can name anyone warmer than what you already hold. Because
//! the best distance only ever shrinks, the walk must end.
//!
//! Every outbound query registers a one-shot completion channel keyed by a
//! request id; the dispatcher routes each `closestNodesResponse` to the
//! channel its id names. That is what lets many lookups run at once without
//! stealing each other's replies.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::protocol::wire::Message;
use crate::protocol::{Cid, Contact, Distance};
use crate::routing::RoutingTable;
use crate::transport::TcpEndpoint;

/// In-flight request registry: one completion channel per outstanding
/// `closestNodesRequest`, keyed by request id.
#[derive(Default)]
pub struct PendingResponses {
    next_id: AtomicU64,
    waiting: Mutex<HashMap<u64, oneshot::Sender<Vec<Contact>>>>,
}

impl PendingResponses {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Allocate a request id and the channel its response will arrive on.
    pub fn register(self: &Arc<Self>) -> PendingQuery {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.waiting.lock().insert(id, tx);
        PendingQuery {
            id,
            rx,
            registry: Arc::clone(self),
        }
    }

    /// Deliver a response to whichever query is waiting on `id`. Returns
    /// false for unknown ids (late replies after a timeout, or noise).
    pub fn complete(&self, id: u64, contacts: Vec<Contact>) -> bool {
        match self.waiting.lock().remove(&id) {
            Some(tx) => tx.send(contacts).is_ok(),
            None => false,
        }
    }

    fn discard(&self, id: u64) {
        self.waiting.lock().remove(&id);
    }

    pub fn outstanding(&self) -> usize {
        self.waiting.lock().len()
    }
}

/// A registered query. Dropping it releases its registry slot, so a
/// cancelled lookup leaves nothing behind.
pub struct PendingQuery {
    id: u64,
    rx: oneshot::Receiver<Vec<Contact>>,
    registry: Arc<PendingResponses>,
}

impl PendingQuery {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait up to `limit` for the paired response. A timeout or a dropped
    /// sender both read as the peer having answered with nothing.
    pub async fn wait(mut self, limit: Duration) -> Vec<Contact> {
        match timeout(limit, &mut self.rx).await {
            Ok(Ok(contacts)) => contacts,
            Ok(Err(_)) | Err(_) => Vec::new(),
        }
    }
}

impl Drop for PendingQuery {
    fn drop(&mut self) {
        self.registry.discard(self.id);
    }
}

/// Lookup tuning knobs.
#[derive(Debug, Clone)]
pub struct LookupConfig {
    /// Candidate set bound; also the seed width.
    pub breadth: usize,
    /// How long one queried peer gets to answer.
    pub hop_timeout: Duration,
    /// Overall time allowed for one lookup; expiry returns the best
    /// gathered so far.
    pub deadline: Duration,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            breadth: 20,
            hop_timeout: Duration::from_secs(2),
            deadline: Duration::from_secs(10),
        }
    }
}

/// Drives iterative closest-node searches over the routing table and
/// transport. Cheap to share; every lookup owns its own candidate state.
pub struct LookupEngine {
    local: Cid,
    local_addr: String,
    table: Arc<RoutingTable>,
    endpoint: Arc<TcpEndpoint>,
    pending: Arc<PendingResponses>,
    config: LookupConfig,
}

impl LookupEngine {
    pub fn new(
        local: Cid,
        local_addr: String,
        table: Arc<RoutingTable>,
        endpoint: Arc<TcpEndpoint>,
        pending: Arc<PendingResponses>,
        config: LookupConfig,
    ) -> Self {
        Self {
            local,
            local_addr,
            table,
            endpoint,
            pending,
            config,
        }
    }

    /// Find up to `k` contacts closest to `target`, converging through the
    /// network. An empty routing table yields an empty result immediately.
    pub async fn lookup(&self, target: &Cid, k: usize) -> Vec<Contact> {
        let mut candidates = self.table.closest(target, self.config.breadth).await;
        if candidates.is_empty() {
            return Vec::new();
        }

        let mut asked: HashSet<Cid> = HashSet::new();
        let mut best: Option<Distance> = None;
        let started = Instant::now();

        loop {
            let elapsed = started.elapsed();
            if elapsed >= self.config.deadline {
                debug!(%target, "lookup deadline reached, returning best so far");
                break;
            }

            // No unasked candidate strictly closer than the best seen means
            // the search has converged.
            let Some(next) = select_next(&candidates, &asked, best, target) else {
                break;
            };
            asked.insert(next.cid);

            let query = self.pending.register();
            trace!(peer = %next.cid, request = query.id(), "querying");
            let request =
                Message::ClosestNodesRequest(self.local_addr.clone(), *target, query.id());
            self.endpoint.send(&next.addr, &request).await;

            let remaining = self.config.deadline - elapsed;
            let reply = query.wait(self.config.hop_timeout.min(remaining)).await;
            merge(&mut candidates, reply, &self.local, target, self.config.breadth);

            let new_best = candidates[0].cid.distance(target);
            match best {
                Some(previous) if new_best >= previous => break,
                _ => best = Some(new_best),
            }
        }

        candidates.truncate(k);
        candidates
    }
}

/// Among unasked candidates strictly closer than `best`, the one nearest the
/// target; ties break by CID so runs are deterministic.
fn select_next(
    candidates: &[Contact],
    asked: &HashSet<Cid>,
    best: Option<Distance>,
    target: &Cid,
) -> Option<Contact> {
    candidates
        .iter()
        .filter(|c| !asked.contains(&c.cid))
        .filter(|c| best.map_or(true, |b| c.cid.distance(target) < b))
        .min_by(|a, b| {
            a.cid
                .distance(target)
                .cmp(&b.cid.distance(target))
                .then_with(|| a.cid.cmp(&b.cid))
        })
        .cloned()
}

/// Union a reply into the candidate set: drop the local CID and duplicates,
/// re-sort by distance to the target, clamp to `bound`.
fn merge(candidates: &mut Vec<Contact>, reply: Vec<Contact>, local: &Cid, target: &Cid, bound: usize) {
    for contact in reply {
        if contact.cid == *local {
            continue;
        }
        if candidates.iter().any(|c| c.cid == contact.cid) {
            continue;
        }
        candidates.push(contact);
    }
    candidates.sort_by(|a, b| {
        a.cid
            .distance(target)
            .cmp(&b.cid.distance(target))
            .then_with(|| a.cid.cmp(&b.cid))
    });
    candidates.truncate(bound);
}
