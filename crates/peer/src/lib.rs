//!
//! The peer client: dial one Flokicoin node, run the version/verack
//! handshake, optionally ask it for the addresses it knows, and hang up.
//!

mod crawl;
pub use crawl::{CrawlClient, CrawlError, CrawlReport};

#[cfg(any(test, feature = "mocks"))]
pub use crawl::MockCrawlClient;

mod client;
pub use client::PeerClient;

mod wire;
