use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bitcoin::network::constants::ServiceFlags;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

use flokiseed_book::{AddressBook, NodeStatus};

use crate::sink::{RecordSink, SinkError};

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// How often the published set is reconciled against the book.
    pub interval: Duration,
    /// How recently a node must have answered a handshake to be published.
    pub good_ttl: Duration,
    /// Cap on adds (and, separately, deletes) per cycle, protecting the
    /// provider's API quota. Leftover diffs carry over to the next cycle.
    pub max_changes_per_cycle: usize,
    /// Service bits a node must advertise to be published.
    pub required_services: ServiceFlags,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10 * 60),
            good_ttl: Duration::from_secs(60 * 60),
            max_changes_per_cycle: 50,
            required_services: ServiceFlags::NONE,
        }
    }
}

/// Periodically projects the healthy slice of the address book onto the
/// record sink.
pub struct Reconciler<S> {
    book: Arc<AddressBook>,
    sink: Arc<S>,
    cfg: ReconcilerConfig,
    /// Whether the sink cache has been primed with a full listing.
    primed: bool,
}

impl<S> Reconciler<S>
where
    S: RecordSink + Send + Sync + 'static,
{
    pub fn new(book: Arc<AddressBook>, sink: Arc<S>, cfg: ReconcilerConfig) -> Self {
        Self {
            book,
            sink,
            cfg,
            primed: false,
        }
    }

    pub async fn run(mut self, cancellation: CancellationToken) {
        let mut timer = tokio::time::interval(self.cfg.interval);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    if let Err(err) = self.reconcile().await {
                        tracing::error!("failed to reconcile published records: {err}");
                    }
                },
                _ = cancellation.cancelled() => {
                    trace!("cancellation received, stopping reconciler");
                    return;
                }
            }
        }
    }

    /// One reconcile cycle: diff the published set against the healthy set
    /// and apply the difference, up to the per-cycle budget. Individual
    /// record failures are logged and retried next cycle.
    pub async fn reconcile(&mut self) -> Result<(), SinkError> {
        let published: HashSet<Ipv4Addr> = if self.primed {
            self.sink.addresses().await
        } else {
            let listed = self.sink.list().await?.into_iter().collect();
            self.primed = true;
            listed
        };

        let good = self.good_set(Instant::now());

        let mut added = 0usize;
        for ip in good
            .difference(&published)
            .take(self.cfg.max_changes_per_cycle)
        {
            match self.sink.add(*ip).await {
                Ok(()) => added += 1,
                Err(err) => warn!(%ip, "failed to publish record: {err}"),
            }
        }

        let mut deleted = 0usize;
        for ip in published
            .difference(&good)
            .take(self.cfg.max_changes_per_cycle)
        {
            match self.sink.delete(*ip).await {
                Ok(()) => deleted += 1,
                Err(err) => warn!(%ip, "failed to retire record: {err}"),
            }
        }

        if added > 0 || deleted > 0 {
            info!(added, deleted, eligible = good.len(), "published record set updated");
        }

        Ok(())
    }

    /// The nodes currently worth publishing: recently reachable, on a
    /// routable public IPv4 address, advertising the required services.
    fn good_set(&self, now: Instant) -> HashSet<Ipv4Addr> {
        self.book
            .snapshot(|rec| rec.status == NodeStatus::Good)
            .into_iter()
            .filter_map(|rec| {
                let fresh = rec
                    .last_connect_success
                    .map(|t| now.saturating_duration_since(t) < self.cfg.good_ttl)
                    .unwrap_or(false);
                if !fresh || !rec.services.has(self.cfg.required_services) {
                    return None;
                }

                match rec.addr.ip() {
                    IpAddr::V4(ip) if routable_v4(ip) => Some(ip),
                    _ => None,
                }
            })
            .collect()
    }
}

fn routable_v4(ip: Ipv4Addr) -> bool {
    !(ip.is_loopback()
        || ip.is_link_local()
        || ip.is_multicast()
        || ip.is_unspecified()
        || ip.is_broadcast())
}
