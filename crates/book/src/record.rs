use std::net::SocketAddr;
use std::time::Instant;

use bitcoin::network::constants::ServiceFlags;

use flokiseed_types::GossipAddr;

/// Lifecycle of a known node, based on our own crawl attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeStatus {
    /// Learned from a seed or from gossip, never crawled yet.
    #[default]
    New,
    /// The most recent handshake succeeded.
    Good,
    /// The most recent handshake failed.
    Bad,
    /// Failed too many times in a row. Never dialed again, kept around only
    /// until the sweep grace period runs out.
    Purge,
}

/// Everything the seeder knows about one `ip:port`.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    /// Canonical endpoint, unique within the book.
    pub addr: SocketAddr,
    pub status: NodeStatus,
    /// Services advertised in the last handshake, or claimed by the peer
    /// that gossiped this address if we never connected.
    pub services: ServiceFlags,
    /// Protocol version observed in the last handshake.
    pub protocol_version: u32,
    /// User agent observed in the last handshake.
    pub user_agent: String,
    /// Best block height the node reported.
    pub last_block: i32,
    /// When the last crawl attempt started.
    pub last_connect_attempt: Option<Instant>,
    /// The attempt timestamp of the last successful handshake. Never ahead
    /// of `last_connect_attempt`.
    pub last_connect_success: Option<Instant>,
    /// The attempt timestamp of the last crawl that harvested addresses.
    pub last_good_time: Option<Instant>,
    /// Consecutive handshake failures since the last success.
    pub connect_fails: u32,
    /// Lifetime crawl attempts.
    pub total_attempts: u64,
    pub(crate) crawl_in_flight: bool,
}

impl NodeRecord {
    pub(crate) fn new(addr: SocketAddr, services: ServiceFlags) -> Self {
        Self {
            addr,
            status: NodeStatus::New,
            services,
            protocol_version: 0,
            user_agent: String::new(),
            last_block: 0,
            last_connect_attempt: None,
            last_connect_success: None,
            last_good_time: None,
            connect_fails: 0,
            total_attempts: 0,
            crawl_in_flight: false,
        }
    }

    /// Whether a crawl worker currently owns this node.
    pub fn in_flight(&self) -> bool {
        self.crawl_in_flight
    }
}

/// What one crawl attempt produced. Committed to the book exactly once.
#[derive(Debug)]
pub struct CrawlResult {
    pub addr: SocketAddr,
    pub outcome: CrawlOutcome,
}

#[derive(Debug)]
pub enum CrawlOutcome {
    /// The handshake completed. `addresses` may be empty: a peer that stays
    /// quiet after `getaddr` still counts as alive.
    Online {
        protocol_version: u32,
        services: ServiceFlags,
        user_agent: String,
        last_block: i32,
        addresses: Vec<GossipAddr>,
    },
    /// The node could not be reached or misbehaved.
    Offline { reason: String },
}
