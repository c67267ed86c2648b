use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bitcoin::network::constants::ServiceFlags;
use tokio_util::sync::CancellationToken;

use flokiseed_book::{AddressBook, BookConfig, CrawlOutcome, CrawlResult, Source};

use crate::{
    RecordAction, RecordMessage, RecordSink, RecordWorker, Reconciler, ReconcilerConfig,
    SinkError,
};

/// In-memory stand-in for a hosted DNS zone: a set of A records plus the
/// sink-side cache, with an operation log for ordering assertions.
#[derive(Default)]
struct MemorySink {
    records: Mutex<HashSet<Ipv4Addr>>,
    cache: Mutex<HashSet<Ipv4Addr>>,
    ops: Mutex<Vec<String>>,
}

impl MemorySink {
    fn with_records(ips: &[&str]) -> Self {
        let sink = Self::default();
        {
            let mut records = sink.records.lock().expect("lock");
            for ip in ips {
                records.insert(ip.parse().expect("valid ip"));
            }
        }
        sink
    }

    fn published(&self) -> HashSet<Ipv4Addr> {
        self.records.lock().expect("lock").clone()
    }

    fn ops(&self) -> Vec<String> {
        self.ops.lock().expect("lock").clone()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn add(&self, ip: Ipv4Addr) -> Result<(), SinkError> {
        self.records.lock().expect("lock").insert(ip);
        self.cache.lock().expect("lock").insert(ip);
        self.ops.lock().expect("lock").push(format!("add {ip}"));
        Ok(())
    }

    async fn delete(&self, ip: Ipv4Addr) -> Result<(), SinkError> {
        self.records.lock().expect("lock").remove(&ip);
        self.cache.lock().expect("lock").remove(&ip);
        self.ops.lock().expect("lock").push(format!("delete {ip}"));
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Ipv4Addr>, SinkError> {
        let records = self.records.lock().expect("lock").clone();
        *self.cache.lock().expect("lock") = records.clone();
        Ok(records.into_iter().collect())
    }

    async fn addresses(&self) -> HashSet<Ipv4Addr> {
        self.cache.lock().expect("lock").clone()
    }
}

fn ip(s: &str) -> Ipv4Addr {
    s.parse().expect("valid ip")
}

/// A book whose every endpoint has just completed a successful handshake.
fn book_with_good(endpoints: &[&str]) -> Arc<AddressBook> {
    let book = Arc::new(AddressBook::new(BookConfig::default()));
    let now = Instant::now();

    for endpoint in endpoints {
        let addr: SocketAddr = format!("{endpoint}:15212").parse().expect("valid endpoint");
        book.insert(&addr.into(), Source::Seed);
    }

    for addr in book.checkout_due(now, endpoints.len()) {
        book.commit(
            CrawlResult {
                addr,
                outcome: CrawlOutcome::Online {
                    protocol_version: 70015,
                    services: ServiceFlags::NETWORK,
                    user_agent: "/Flokicoin:1.0.0/".into(),
                    last_block: 1,
                    addresses: Vec::new(),
                },
            },
            now,
        );
    }

    book
}

fn reconciler(
    book: Arc<AddressBook>,
    sink: Arc<MemorySink>,
    cfg: ReconcilerConfig,
) -> Reconciler<MemorySink> {
    Reconciler::new(book, sink, cfg)
}

#[tokio::test]
async fn publishes_good_nodes() {
    let sink = Arc::new(MemorySink::default());
    let book = book_with_good(&["1.1.1.1"]);

    let mut rec = reconciler(book, sink.clone(), ReconcilerConfig::default());
    rec.reconcile().await.expect("reconcile");

    assert_eq!(sink.published(), HashSet::from([ip("1.1.1.1")]));
}

#[tokio::test]
async fn retires_records_without_a_healthy_node() {
    let sink = Arc::new(MemorySink::with_records(&["2.2.2.2"]));
    let book = Arc::new(AddressBook::new(BookConfig::default()));

    let mut rec = reconciler(book, sink.clone(), ReconcilerConfig::default());
    rec.reconcile().await.expect("reconcile");

    assert!(sink.published().is_empty());
}

#[tokio::test]
async fn converges_on_the_healthy_set() {
    let sink = Arc::new(MemorySink::with_records(&["2.2.2.2", "3.3.3.3"]));
    let book = book_with_good(&["1.1.1.1", "3.3.3.3"]);

    let mut rec = reconciler(book, sink.clone(), ReconcilerConfig::default());
    rec.reconcile().await.expect("reconcile");

    assert_eq!(
        sink.published(),
        HashSet::from([ip("1.1.1.1"), ip("3.3.3.3")])
    );
}

#[tokio::test]
async fn change_budget_spreads_work_over_cycles() {
    let sink = Arc::new(MemorySink::default());
    let book = book_with_good(&["1.1.1.1", "2.2.2.2", "3.3.3.3", "4.4.4.4", "5.5.5.5"]);

    let mut rec = reconciler(
        book,
        sink.clone(),
        ReconcilerConfig {
            max_changes_per_cycle: 2,
            ..ReconcilerConfig::default()
        },
    );

    rec.reconcile().await.expect("reconcile");
    assert_eq!(sink.published().len(), 2);

    rec.reconcile().await.expect("reconcile");
    assert_eq!(sink.published().len(), 4);

    rec.reconcile().await.expect("reconcile");
    assert_eq!(sink.published().len(), 5);
}

#[tokio::test]
async fn stale_nodes_are_not_published() {
    let sink = Arc::new(MemorySink::default());
    let book = book_with_good(&["1.1.1.1"]);

    // A zero freshness window rules everything out.
    let mut rec = reconciler(
        book,
        sink.clone(),
        ReconcilerConfig {
            good_ttl: Duration::ZERO,
            ..ReconcilerConfig::default()
        },
    );
    rec.reconcile().await.expect("reconcile");

    assert!(sink.published().is_empty());
}

#[tokio::test]
async fn unroutable_and_unqualified_nodes_are_not_published() {
    let sink = Arc::new(MemorySink::default());
    // A loopback seed can become Good but must never reach DNS.
    let book = book_with_good(&["127.0.0.1"]);

    let mut rec = reconciler(
        book.clone(),
        sink.clone(),
        ReconcilerConfig::default(),
    );
    rec.reconcile().await.expect("reconcile");
    assert!(sink.published().is_empty());

    // A node that lacks the required service bits is skipped too.
    let book = book_with_good(&["1.1.1.1"]);
    let mut rec = reconciler(
        book,
        sink.clone(),
        ReconcilerConfig {
            required_services: ServiceFlags::NETWORK | ServiceFlags::WITNESS,
            ..ReconcilerConfig::default()
        },
    );
    rec.reconcile().await.expect("reconcile");
    assert!(sink.published().is_empty());
}

#[tokio::test]
async fn add_and_delete_are_idempotent() {
    let sink = MemorySink::default();

    sink.add(ip("3.3.3.3")).await.expect("add");
    let once = sink.published();
    sink.add(ip("3.3.3.3")).await.expect("add again");
    assert_eq!(sink.published(), once);

    sink.delete(ip("3.3.3.3")).await.expect("delete");
    let gone = sink.published();
    sink.delete(ip("3.3.3.3")).await.expect("delete again");
    assert_eq!(sink.published(), gone);
    assert!(gone.is_empty());
}

#[tokio::test]
async fn worker_applies_messages_in_arrival_order() {
    let sink = Arc::new(MemorySink::default());
    let (tx, rx) = flume::bounded(8);
    let worker = RecordWorker::new(sink.clone(), rx);

    let handle = tokio::spawn(worker.run(CancellationToken::new()));

    let changes = [
        (RecordAction::Add, "1.1.1.1"),
        (RecordAction::Add, "2.2.2.2"),
        (RecordAction::Delete, "1.1.1.1"),
    ];
    for (action, target) in changes {
        tx.send_async(RecordMessage {
            domain: "dnsseed.flokicoin.org".into(),
            ip: ip(target),
            action,
        })
        .await
        .expect("send");
    }
    drop(tx);

    handle.await.expect("worker");

    assert_eq!(
        sink.ops(),
        vec!["add 1.1.1.1", "add 2.2.2.2", "delete 1.1.1.1"]
    );
    assert_eq!(sink.published(), HashSet::from([ip("2.2.2.2")]));
}
