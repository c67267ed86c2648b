use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use eyre::Context;
use serde::Deserialize;

use flokiseed_book::BookConfig;
use flokiseed_crawler::CrawlerConfig;
use flokiseed_types::Network;

#[derive(Debug, Deserialize, Clone)]
pub struct CrawlerSection {
    /// Endpoints the crawl starts from. Hostnames are resolved at startup.
    pub seeds: Vec<String>,

    /// Maximum amount of crawls in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Soft cap on the number of tracked nodes.
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    #[serde(default = "default_crawl_tick_secs")]
    pub crawl_tick_secs: u64,

    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,

    #[serde(default = "default_getaddr_timeout_secs")]
    pub getaddr_timeout_secs: u64,

    /// Consecutive failures after which a node is given up on.
    #[serde(default = "default_purge_threshold")]
    pub purge_threshold: u32,

    #[serde(default = "default_purge_grace_secs")]
    pub purge_grace_secs: u64,

    /// Service bits a node must advertise to be published, as a raw mask.
    #[serde(default)]
    pub service_mask: u64,

    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_concurrency() -> usize {
    1024
}

fn default_max_size() -> usize {
    100_000
}

fn default_crawl_tick_secs() -> u64 {
    1
}

fn default_handshake_timeout_secs() -> u64 {
    3
}

fn default_getaddr_timeout_secs() -> u64 {
    5
}

fn default_purge_threshold() -> u32 {
    8
}

fn default_purge_grace_secs() -> u64 {
    3 * 24 * 60 * 60
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

impl CrawlerSection {
    /// Resolve the configured seeds. A seed without a port gets the
    /// network's default one.
    pub fn resolve_seeds(&self, network: Network) -> eyre::Result<Vec<SocketAddr>> {
        Ok(self
            .seeds
            .iter()
            .map(|x| match x.to_socket_addrs() {
                Ok(addrs) => Ok(addrs.collect::<Vec<_>>()),
                Err(_) => (x.as_str(), network.default_port())
                    .to_socket_addrs()
                    .map(|addrs| addrs.collect())
                    .wrap_err("Failed to resolve seed address"),
            })
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .collect())
    }

    pub fn book_config(&self) -> BookConfig {
        BookConfig {
            max_size: self.max_size,
            purge_threshold: self.purge_threshold,
            purge_grace: Duration::from_secs(self.purge_grace_secs),
            ..BookConfig::default()
        }
    }

    pub fn crawler_config(&self) -> CrawlerConfig {
        CrawlerConfig {
            concurrency: self.concurrency,
            crawl_tick: Duration::from_secs(self.crawl_tick_secs),
            handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
            getaddr_timeout: Duration::from_secs(self.getaddr_timeout_secs),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
            ..CrawlerConfig::default()
        }
    }
}
