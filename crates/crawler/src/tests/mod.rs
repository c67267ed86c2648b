use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::network::constants::ServiceFlags;
use tokio_util::sync::CancellationToken;

use flokiseed_book::{AddressBook, BookConfig, NodeStatus, Source};
use flokiseed_peer::{CrawlClient, CrawlError, CrawlReport};
use flokiseed_types::GossipAddr;

use crate::{Crawler, CrawlerConfig};

enum Script {
    Online(Vec<&'static str>),
    Offline,
    Panic,
    Slow(Duration),
}

/// Crawl client that answers from a fixed script instead of the network.
struct ScriptedClient {
    peers: HashMap<SocketAddr, Script>,
}

impl ScriptedClient {
    fn new(peers: Vec<(&str, Script)>) -> Self {
        Self {
            peers: peers
                .into_iter()
                .map(|(addr, script)| (addr.parse().expect("valid address"), script))
                .collect(),
        }
    }
}

fn report(addresses: Vec<&str>) -> CrawlReport {
    CrawlReport {
        protocol_version: 70015,
        services: ServiceFlags::NETWORK,
        user_agent: "/Flokicoin:1.0.0/".into(),
        last_block: 77,
        addresses: addresses
            .iter()
            .map(|a| GossipAddr::from(a.parse::<SocketAddr>().expect("valid address")))
            .collect(),
    }
}

#[async_trait]
impl CrawlClient for ScriptedClient {
    async fn crawl(
        &self,
        addr: SocketAddr,
        _skip_getaddr: bool,
    ) -> Result<CrawlReport, CrawlError> {
        match self.peers.get(&addr) {
            Some(Script::Online(addresses)) => Ok(report(addresses.clone())),
            Some(Script::Panic) => panic!("scripted crawl panic"),
            Some(Script::Slow(delay)) => {
                tokio::time::sleep(*delay).await;
                Ok(report(Vec::new()))
            }
            Some(Script::Offline) | None => Err(CrawlError::Dial(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))),
        }
    }
}

fn config() -> CrawlerConfig {
    CrawlerConfig {
        concurrency: 8,
        crawl_tick: Duration::from_millis(10),
        sweep_interval: Duration::from_secs(60),
        handshake_timeout: Duration::from_millis(200),
        getaddr_timeout: Duration::from_millis(200),
        shutdown_grace: Duration::from_millis(500),
    }
}

fn seeded_book(seeds: &[&str]) -> Arc<AddressBook> {
    let book = Arc::new(AddressBook::new(BookConfig::default()));
    for seed in seeds {
        let addr: SocketAddr = seed.parse().expect("valid address");
        book.insert(&addr.into(), Source::Seed);
    }
    book
}

fn status_of(book: &AddressBook, endpoint: &str) -> Option<NodeStatus> {
    let target: SocketAddr = endpoint.parse().expect("valid address");
    book.snapshot(|rec| rec.addr == target)
        .first()
        .map(|rec| rec.status)
}

async fn wait_for(book: &AddressBook, check: impl Fn(&AddressBook) -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if check(book) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn bootstrap_discovers_gossiped_peers() {
    let book = seeded_book(&["1.2.3.4:15212"]);
    let client = Arc::new(ScriptedClient::new(vec![
        ("1.2.3.4:15212", Script::Online(vec![
            "5.6.7.8:15212",
            "9.10.11.12:15212",
        ])),
        ("5.6.7.8:15212", Script::Slow(Duration::from_secs(60))),
        ("9.10.11.12:15212", Script::Slow(Duration::from_secs(60))),
    ]));

    let cancellation = CancellationToken::new();
    let crawler = Crawler::new(book.clone(), client, CrawlerConfig {
        shutdown_grace: Duration::from_millis(50),
        ..config()
    });
    let handle = tokio::spawn(crawler.run(cancellation.clone()));

    wait_for(&book, |book| book.len() == 3).await;
    wait_for(&book, |book| {
        status_of(book, "1.2.3.4:15212") == Some(NodeStatus::Good)
    })
    .await;

    cancellation.cancel();
    handle.await.expect("crawler");

    assert_eq!(book.len(), 3);
}

#[tokio::test]
async fn failures_feed_the_state_machine() {
    let book = seeded_book(&["1.2.3.4:15212"]);
    let client = Arc::new(ScriptedClient::new(vec![("1.2.3.4:15212", Script::Offline)]));

    let cancellation = CancellationToken::new();
    let crawler = Crawler::new(book.clone(), client, config());
    let handle = tokio::spawn(crawler.run(cancellation.clone()));

    wait_for(&book, |book| {
        status_of(book, "1.2.3.4:15212") == Some(NodeStatus::Bad)
    })
    .await;

    cancellation.cancel();
    handle.await.expect("crawler");

    let nodes = book.snapshot(|_| true);
    let rec = &nodes[0];
    assert_eq!(rec.connect_fails, 1);
    assert!(!rec.in_flight());
}

#[tokio::test]
async fn a_panicking_crawl_does_not_stop_the_others() {
    let book = seeded_book(&["1.2.3.4:15212", "5.6.7.8:15212"]);
    let client = Arc::new(ScriptedClient::new(vec![
        ("1.2.3.4:15212", Script::Panic),
        ("5.6.7.8:15212", Script::Online(Vec::new())),
    ]));

    let cancellation = CancellationToken::new();
    let crawler = Crawler::new(book.clone(), client, config());
    let handle = tokio::spawn(crawler.run(cancellation.clone()));

    wait_for(&book, |book| {
        status_of(book, "1.2.3.4:15212") == Some(NodeStatus::Bad)
            && status_of(book, "5.6.7.8:15212") == Some(NodeStatus::Good)
    })
    .await;

    cancellation.cancel();
    handle.await.expect("crawler");
}

#[tokio::test]
async fn shutdown_drains_in_flight_crawls() {
    let book = seeded_book(&["1.2.3.4:15212"]);
    let client = Arc::new(ScriptedClient::new(vec![(
        "1.2.3.4:15212",
        Script::Slow(Duration::from_millis(100)),
    )]));

    let cancellation = CancellationToken::new();
    let crawler = Crawler::new(book.clone(), client, config());
    let handle = tokio::spawn(crawler.run(cancellation.clone()));

    wait_for(&book, |book| book.in_flight() == 1).await;
    cancellation.cancel();
    handle.await.expect("crawler");

    // The in-flight result was still committed during the drain.
    assert_eq!(status_of(&book, "1.2.3.4:15212"), Some(NodeStatus::Good));
    assert_eq!(book.in_flight(), 0);
}
