use std::net::SocketAddr;

use async_trait::async_trait;
use bitcoin::network::constants::ServiceFlags;

use flokiseed_types::GossipAddr;

/// What a completed handshake told us about a peer.
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub protocol_version: u32,
    pub services: ServiceFlags,
    pub user_agent: String,
    pub last_block: i32,
    /// Addresses the peer shared. Empty when the peer stayed quiet or when
    /// the harvest was skipped.
    pub addresses: Vec<GossipAddr>,
}

/// Why a crawl attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("dial failed: {0}")]
    Dial(#[source] std::io::Error),

    #[error("handshake timed out")]
    HandshakeTimeout,

    #[error("connection lost during address harvest")]
    GetAddrTimeout,

    #[error("protocol violation: {0}")]
    Protocol(String),
}

/// A client able to probe one peer endpoint.
#[async_trait]
pub trait CrawlClient {
    /// Dial `addr`, handshake, and harvest one batch of gossiped addresses.
    /// With `skip_getaddr` the harvest phase is skipped and only liveness is
    /// confirmed. The connection is fully released before this returns.
    async fn crawl(&self, addr: SocketAddr, skip_getaddr: bool)
        -> Result<CrawlReport, CrawlError>;
}

#[cfg(any(test, feature = "mocks"))]
mockall::mock! {
    pub CrawlClient { }

    #[async_trait]
    impl CrawlClient for CrawlClient {
        async fn crawl(
            &self,
            addr: SocketAddr,
            skip_getaddr: bool,
        ) -> Result<CrawlReport, CrawlError>;
    }
}
