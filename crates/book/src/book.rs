use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace};

use flokiseed_types::GossipAddr;

use crate::record::{CrawlOutcome, CrawlResult, NodeRecord, NodeStatus};

/// Where an address entered the book from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Source {
    /// Configured seed or operator-supplied endpoint. Always admitted.
    Seed,
    /// Learned from another peer. Dropped once the book is full.
    Gossip,
}

/// Tuning knobs for the book's schedule and capacity.
#[derive(Debug, Clone)]
pub struct BookConfig {
    /// Soft cap on the number of tracked nodes.
    pub max_size: usize,
    /// Consecutive failures after which a node is given up on.
    pub purge_threshold: u32,
    /// How long a given-up node lingers before the sweep drops it.
    pub purge_grace: Duration,
    /// Re-crawl interval for healthy nodes.
    pub good_recrawl: Duration,
    /// First rung of the failure backoff ladder.
    pub backoff_base: Duration,
    /// Ceiling of the failure backoff ladder.
    pub backoff_max: Duration,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            max_size: 100_000,
            purge_threshold: 8,
            purge_grace: Duration::from_secs(3 * 24 * 60 * 60),
            good_recrawl: Duration::from_secs(15 * 60),
            backoff_base: Duration::from_secs(2 * 60),
            backoff_max: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Node counts by status, for periodic reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub new: usize,
    pub good: usize,
    pub bad: usize,
    pub purge: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.new + self.good + self.bad + self.purge
    }
}

struct Inner {
    nodes: HashMap<SocketAddr, NodeRecord>,
    /// Rotating scan order: checked endpoints move to the back, so a flood
    /// of fresh gossip cannot starve overdue healthy nodes.
    scan: VecDeque<SocketAddr>,
    in_flight: usize,
}

/// Book of known nodes. All operations are atomic; the lock is never held
/// across an await point.
pub struct AddressBook {
    cfg: BookConfig,
    inner: Mutex<Inner>,
}

impl AddressBook {
    pub fn new(cfg: BookConfig) -> Self {
        Self {
            cfg,
            inner: Mutex::new(Inner {
                nodes: HashMap::new(),
                scan: VecDeque::new(),
                in_flight: 0,
            }),
        }
    }

    /// Record a sighting of `addr`. Creates the node if it is unknown,
    /// touches nothing otherwise. Returns whether a node was inserted.
    pub fn insert(&self, addr: &GossipAddr, source: Source) -> bool {
        let mut inner = self.inner.lock();

        if source == Source::Gossip {
            if !addr.is_routable() {
                return false;
            }
            if inner.nodes.len() >= self.cfg.max_size {
                trace!(addr = %addr.socket_addr(), "book is full, dropping gossiped address");
                return false;
            }
        }

        inner.insert(addr)
    }

    /// Number of tracked nodes.
    pub fn len(&self) -> usize {
        self.inner.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the book has reached its capacity cap. Crawl workers use this
    /// to skip the harvest phase while still confirming liveness.
    pub fn is_full(&self) -> bool {
        let inner = self.inner.lock();
        inner.nodes.len() >= self.cfg.max_size
    }

    /// Number of nodes currently owned by crawl workers.
    pub fn in_flight(&self) -> usize {
        self.inner.lock().in_flight
    }

    /// Node counts by status.
    pub fn status_counts(&self) -> StatusCounts {
        let inner = self.inner.lock();
        let mut counts = StatusCounts::default();
        for rec in inner.nodes.values() {
            match rec.status {
                NodeStatus::New => counts.new += 1,
                NodeStatus::Good => counts.good += 1,
                NodeStatus::Bad => counts.bad += 1,
                NodeStatus::Purge => counts.purge += 1,
            }
        }
        counts
    }

    /// Hand out up to `max` nodes that are due for a crawl, marking each as
    /// owned by a worker and stamping the attempt. A node stays out of
    /// rotation until its result is committed.
    pub fn checkout_due(&self, now: Instant, max: usize) -> Vec<SocketAddr> {
        let mut inner = self.inner.lock();
        let Inner {
            nodes,
            scan,
            in_flight,
        } = &mut *inner;

        let mut due = Vec::new();
        let mut scanned = 0;
        let rotation = scan.len();

        while scanned < rotation && due.len() < max {
            let Some(addr) = scan.pop_front() else {
                break;
            };
            scanned += 1;

            // Swept endpoints fall out of the rotation here.
            let Some(rec) = nodes.get_mut(&addr) else {
                continue;
            };

            if self.is_due(rec, now) {
                rec.crawl_in_flight = true;
                rec.last_connect_attempt = Some(now);
                rec.total_attempts += 1;
                *in_flight += 1;
                due.push(addr);
            }

            scan.push_back(addr);
        }

        due
    }

    /// Ingest the result of one crawl attempt: release the worker's claim,
    /// run the status transition and merge any harvested addresses.
    pub fn commit(&self, result: CrawlResult, now: Instant) {
        let mut inner = self.inner.lock();

        let Some(rec) = inner.nodes.get_mut(&result.addr) else {
            return;
        };
        if !rec.crawl_in_flight {
            // A stale result for a node we no longer consider checked out.
            return;
        }
        rec.crawl_in_flight = false;
        inner.in_flight -= 1;

        match result.outcome {
            CrawlOutcome::Online {
                protocol_version,
                services,
                user_agent,
                last_block,
                addresses,
            } => {
                let rec = inner
                    .nodes
                    .get_mut(&result.addr)
                    .expect("present above; the lock is still held");

                rec.status = NodeStatus::Good;
                rec.connect_fails = 0;
                rec.protocol_version = protocol_version;
                rec.services = services;
                rec.user_agent = user_agent;
                rec.last_block = last_block;
                rec.last_connect_success = rec.last_connect_attempt;
                if !addresses.is_empty() {
                    rec.last_good_time = rec.last_connect_attempt;
                }

                trace!(
                    addr = %result.addr,
                    version = protocol_version,
                    harvested = addresses.len(),
                    "node is reachable"
                );

                let saturated = inner.nodes.len() >= self.cfg.max_size;
                if !saturated {
                    let mut merged = 0;
                    for gossip in &addresses {
                        if !gossip.is_routable() {
                            continue;
                        }
                        if inner.nodes.len() >= self.cfg.max_size {
                            break;
                        }
                        if inner.insert(gossip) {
                            merged += 1;
                        }
                    }
                    if merged > 0 {
                        debug!(source = %result.addr, merged, "merged gossiped addresses");
                    }
                }
            }
            CrawlOutcome::Offline { reason } => {
                let rec = inner
                    .nodes
                    .get_mut(&result.addr)
                    .expect("present above; the lock is still held");

                match rec.status {
                    NodeStatus::New | NodeStatus::Good => {
                        rec.status = NodeStatus::Bad;
                        rec.connect_fails = 1;
                    }
                    NodeStatus::Bad => {
                        rec.connect_fails += 1;
                        if rec.connect_fails >= self.cfg.purge_threshold {
                            rec.status = NodeStatus::Purge;
                        }
                    }
                    // Purged nodes are never dispatched, so no result can
                    // arrive for them.
                    NodeStatus::Purge => {}
                }

                trace!(
                    addr = %result.addr,
                    fails = rec.connect_fails,
                    status = ?rec.status,
                    %reason,
                    "node is unreachable"
                );
            }
        }
    }

    /// A copy of every node matching `filter`, for read-only consumers.
    pub fn snapshot(&self, filter: impl Fn(&NodeRecord) -> bool) -> Vec<NodeRecord> {
        let inner = self.inner.lock();
        inner
            .nodes
            .values()
            .filter(|rec| filter(rec))
            .cloned()
            .collect()
    }

    /// Drop given-up nodes whose grace period has run out. Returns how many
    /// were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut inner = self.inner.lock();
        let grace = self.cfg.purge_grace;
        let before = inner.nodes.len();

        inner.nodes.retain(|_, rec| {
            if rec.status != NodeStatus::Purge || rec.crawl_in_flight {
                return true;
            }
            match rec.last_connect_attempt {
                Some(last) => now.saturating_duration_since(last) < grace,
                None => true,
            }
        });

        before - inner.nodes.len()
    }

    fn is_due(&self, rec: &NodeRecord, now: Instant) -> bool {
        if rec.crawl_in_flight || rec.status == NodeStatus::Purge {
            return false;
        }

        let Some(last) = rec.last_connect_attempt else {
            return true;
        };
        let elapsed = now.saturating_duration_since(last);

        match rec.status {
            NodeStatus::New => true,
            NodeStatus::Good => elapsed >= self.cfg.good_recrawl,
            NodeStatus::Bad => elapsed >= self.backoff(rec.connect_fails),
            NodeStatus::Purge => false,
        }
    }

    /// Delay before the next attempt at a failing node: doubles with every
    /// consecutive failure, up to the configured ceiling.
    fn backoff(&self, fails: u32) -> Duration {
        let factor = 1u32.checked_shl(fails).unwrap_or(u32::MAX);
        self.cfg
            .backoff_base
            .saturating_mul(factor)
            .min(self.cfg.backoff_max)
    }
}

impl Inner {
    fn insert(&mut self, addr: &GossipAddr) -> bool {
        let endpoint = addr.socket_addr();
        if self.nodes.contains_key(&endpoint) {
            return false;
        }

        self.nodes
            .insert(endpoint, NodeRecord::new(endpoint, addr.services));
        self.scan.push_back(endpoint);
        true
    }
}
