//! XOR-bucketed routing table
//!
//! Feynman: the table is a phone book organized by how much a number looks
//! like yours. Bucket i holds peers whose highest differing bit is bit i, so
//! you keep fine-grained knowledge of your own neighborhood and only a
//! sketch of the far side of the identifier space. That asymmetry is what
//! makes lookups converge in O(log n) hops.

use std::fmt::Write as _;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

use crate::protocol::{bucket_index, Cid, Contact, CID_BITS};

/// One bucket per possible prefix length.
pub const BUCKET_COUNT: usize = CID_BITS;

#[derive(Debug)]
struct Bucket {
    contacts: Vec<Contact>,
    last_activity: Option<Instant>,
}

impl Bucket {
    fn new() -> Self {
        Self {
            contacts: Vec::new(),
            last_activity: None,
        }
    }

    fn touch(&mut self) {
        self.last_activity = Some(Instant::now());
    }

    fn contains(&self, cid: &Cid) -> bool {
        self.contacts.iter().any(|c| &c.cid == cid)
    }

    /// Empty buckets always want a probe; populated ones only once their
    /// last activity has aged past the threshold.
    fn is_stale(&self, threshold: Duration) -> bool {
        if self.contacts.is_empty() {
            return true;
        }
        match self.last_activity {
            Some(at) => at.elapsed() >= threshold,
            None => true,
        }
    }
}

/// 160 buckets of contacts, indexed by the bit length of the XOR distance
/// from the local CID. Insert and closest are atomic with respect to each
/// other; the table is shared between the dispatcher and the refresh loop.
pub struct RoutingTable {
    local: Cid,
    k: usize,
    buckets: RwLock<Vec<Bucket>>,
}

impl RoutingTable {
    pub fn new(local: Cid, k: usize) -> Self {
        let buckets = (0..BUCKET_COUNT).map(|_| Bucket::new()).collect();
        Self {
            local,
            k,
            buckets: RwLock::new(buckets),
        }
    }

    pub fn local_cid(&self) -> Cid {
        self.local
    }

    /// Add a contact to the bucket its CID selects. The local CID is never
    /// tracked, duplicates keep their first-seen slot, and a full bucket
    /// drops the newcomer. Returns true when the contact is newly added.
    pub async fn insert(&self, contact: Contact) -> bool {
        let Some(index) = bucket_index(&self.local, &contact.cid) else {
            return false;
        };
        let mut buckets = self.buckets.write().await;
        let bucket = &mut buckets[index];
        if bucket.contains(&contact.cid) {
            bucket.touch();
            return false;
        }
        if bucket.contacts.len() >= self.k {
            debug!(bucket = index, cid = %contact.cid, "bucket full, dropping contact");
            return false;
        }
        debug!(bucket = index, cid = %contact.cid, addr = %contact.addr, "learned contact");
        bucket.contacts.push(contact);
        bucket.touch();
        true
    }

    /// The n known contacts nearest to `target`, sorted by ascending XOR
    /// distance with CID as the tie break. A full scan is fine: the table
    /// never holds more than 160 * k entries.
    pub async fn closest(&self, target: &Cid, n: usize) -> Vec<Contact> {
        let buckets = self.buckets.read().await;
        let mut all: Vec<Contact> = buckets
            .iter()
            .flat_map(|b| b.contacts.iter().cloned())
            .collect();
        all.sort_by(|a, b| {
            a.cid
                .distance(target)
                .cmp(&b.cid.distance(target))
                .then_with(|| a.cid.cmp(&b.cid))
        });
        all.truncate(n);
        all
    }

    pub async fn len(&self) -> usize {
        let buckets = self.buckets.read().await;
        buckets.iter().map(|b| b.contacts.len()).sum()
    }

    pub async fn bucket_contacts(&self, index: usize) -> Vec<Contact> {
        let buckets = self.buckets.read().await;
        buckets
            .get(index)
            .map(|b| b.contacts.clone())
            .unwrap_or_default()
    }

    /// Indexes of buckets due for a refresh probe.
    pub async fn stale_buckets(&self, threshold: Duration) -> Vec<usize> {
        let buckets = self.buckets.read().await;
        buckets
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_stale(threshold))
            .map(|(i, _)| i)
            .collect()
    }

    pub async fn mark_refreshed(&self, index: usize) {
        let mut buckets = self.buckets.write().await;
        if let Some(bucket) = buckets.get_mut(index) {
            bucket.touch();
        }
    }

    /// Render the non-empty buckets for diagnostics.
    pub async fn render(&self) -> String {
        let buckets = self.buckets.read().await;
        let mut out = String::new();
        for (i, bucket) in buckets.iter().enumerate() {
            if bucket.contacts.is_empty() {
                continue;
            }
            let _ = write!(out, "bucket {i:>3}:");
            for contact in &bucket.contacts {
                let _ = write!(out, " {}@{}", contact.cid, contact.addr);
            }
            out.push('\n');
        }
        out
    }
}
