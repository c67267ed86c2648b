//!
//! The crawl scheduler. On every tick it checks out the nodes that are due
//! for a probe, hands each to its own task, and commits the results back
//! into the address book as they arrive.
//!

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use flokiseed_book::{AddressBook, CrawlOutcome, CrawlResult};
use flokiseed_peer::CrawlClient;

#[cfg(test)]
mod tests;

/// Headroom on top of the per-phase timeouts before a crawl task is killed.
const DEADLINE_SLACK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Maximum number of crawls in flight at once.
    pub concurrency: usize,
    /// How often due nodes are dispatched.
    pub crawl_tick: Duration,
    /// How often given-up nodes are swept out of the book.
    pub sweep_interval: Duration,
    /// Budget for the version/verack exchange of one crawl.
    pub handshake_timeout: Duration,
    /// Budget for the address harvest of one crawl.
    pub getaddr_timeout: Duration,
    /// How long shutdown waits for in-flight crawls to report back.
    pub shutdown_grace: Duration,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1024,
            crawl_tick: Duration::from_secs(1),
            sweep_interval: Duration::from_secs(60),
            handshake_timeout: Duration::from_secs(3),
            getaddr_timeout: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

/// Drives the discovery loop: book -> workers -> book.
pub struct Crawler<C> {
    book: Arc<AddressBook>,
    client: Arc<C>,
    cfg: CrawlerConfig,
    results_tx: flume::Sender<CrawlResult>,
    results_rx: flume::Receiver<CrawlResult>,
}

impl<C> Crawler<C>
where
    C: CrawlClient + Send + Sync + 'static,
{
    pub fn new(book: Arc<AddressBook>, client: Arc<C>, cfg: CrawlerConfig) -> Self {
        let (results_tx, results_rx) = flume::bounded(cfg.concurrency);

        Self {
            book,
            client,
            cfg,
            results_tx,
            results_rx,
        }
    }

    pub async fn run(self, cancellation: CancellationToken) {
        let mut crawl_tick = tokio::time::interval(self.cfg.crawl_tick);
        let mut sweep_tick = tokio::time::interval(self.cfg.sweep_interval);

        loop {
            tokio::select! {
                result = self.results_rx.recv_async() => {
                    let Ok(result) = result else {
                        trace!("all result senders are dropped");
                        return;
                    };
                    self.book.commit(result, Instant::now());
                },
                _ = crawl_tick.tick() => self.dispatch(),
                _ = sweep_tick.tick() => {
                    let swept = self.book.sweep(Instant::now());
                    if swept > 0 {
                        debug!(swept, "dropped unreachable nodes from the book");
                    }

                    let counts = self.book.status_counts();
                    debug!(
                        total = counts.total(),
                        good = counts.good,
                        new = counts.new,
                        bad = counts.bad,
                        in_flight = self.book.in_flight(),
                        "book status"
                    );
                },
                _ = cancellation.cancelled() => {
                    trace!("cancellation received, stopping crawl dispatch");
                    break;
                }
            }
        }

        self.drain().await;
    }

    /// Hand every due node to its own crawl task, bounded by the free
    /// worker slots.
    fn dispatch(&self) {
        let slots = self.cfg.concurrency.saturating_sub(self.book.in_flight());
        if slots == 0 {
            return;
        }

        let due = self.book.checkout_due(Instant::now(), slots);
        if due.is_empty() {
            return;
        }
        trace!(count = due.len(), "dispatching crawl attempts");

        // Under saturation the handshake still confirms liveness, but there
        // is no room for more addresses.
        let skip_getaddr = self.book.is_full();
        for addr in due {
            self.spawn_crawl(addr, skip_getaddr);
        }
    }

    fn spawn_crawl(&self, addr: SocketAddr, skip_getaddr: bool) {
        let client = self.client.clone();
        let results = self.results_tx.clone();
        let deadline = self.cfg.handshake_timeout + self.cfg.getaddr_timeout + DEADLINE_SLACK;

        tokio::spawn(async move {
            let crawl = AssertUnwindSafe(client.crawl(addr, skip_getaddr)).catch_unwind();

            let outcome = match tokio::time::timeout(deadline, crawl).await {
                Ok(Ok(Ok(report))) => CrawlOutcome::Online {
                    protocol_version: report.protocol_version,
                    services: report.services,
                    user_agent: report.user_agent,
                    last_block: report.last_block,
                    addresses: report.addresses,
                },
                Ok(Ok(Err(err))) => CrawlOutcome::Offline {
                    reason: err.to_string(),
                },
                // A panicking crawl must not take the seeder down with it.
                Ok(Err(_panic)) => CrawlOutcome::Offline {
                    reason: "crawl task panicked".to_string(),
                },
                Err(_elapsed) => CrawlOutcome::Offline {
                    reason: "crawl deadline exceeded".to_string(),
                },
            };

            let _ = results.send_async(CrawlResult { addr, outcome }).await;
        });
    }

    /// Keep committing results from in-flight crawls until they are all
    /// accounted for or the grace period runs out.
    async fn drain(&self) {
        let deadline = Instant::now() + self.cfg.shutdown_grace;

        while self.book.in_flight() > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(
                    abandoned = self.book.in_flight(),
                    "shutdown grace expired with crawls still in flight"
                );
                return;
            }

            match tokio::time::timeout(remaining, self.results_rx.recv_async()).await {
                Ok(Ok(result)) => self.book.commit(result, Instant::now()),
                Ok(Err(_)) | Err(_) => return,
            }
        }
    }
}
