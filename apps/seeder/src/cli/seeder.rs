use std::sync::Arc;
use std::time::Duration;

use eyre::WrapErr;
use tokio::select;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use flokiseed_book::{AddressBook, Source};
use flokiseed_crawler::Crawler;
use flokiseed_dns::{CloudflareSink, Reconciler};
use flokiseed_peer::PeerClient;

use crate::config::SeederConfig;

/// The limit of time to wait for the services to shut down.
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Seeder encapsulates the crawler and reconciler services.
pub struct Seeder {
    config: SeederConfig,
    book: Arc<AddressBook>,
    sink: Arc<CloudflareSink>,

    cancellation: CancellationToken,
    pub(crate) task_tracker: TaskTracker,
}

impl Seeder {
    /// Fails fast on anything that would make the seeder useless: an empty
    /// seed list, a rejected API token, or a hostname outside every zone the
    /// token can manage.
    pub async fn new(config: SeederConfig) -> eyre::Result<Self> {
        let seeds = config.crawler.resolve_seeds(config.network)?;
        if seeds.is_empty() {
            eyre::bail!("at least one seed endpoint is required");
        }

        let book = Arc::new(AddressBook::new(config.crawler.book_config()));
        for seed in seeds {
            book.insert(&seed.into(), Source::Seed);
        }

        let sink = Arc::new(
            CloudflareSink::new(&config.dns.api_token, &config.dns.hostname)
                .await
                .wrap_err("failed to initialize the DNS backend")?,
        );

        Ok(Self {
            config,
            book,
            sink,
            cancellation: CancellationToken::new(),
            task_tracker: TaskTracker::new(),
        })
    }

    pub fn run(&self) {
        self.spawn_crawler();
        self.spawn_reconciler();

        self.task_tracker.close();

        info!(
            network = %self.config.network,
            hostname = %self.config.dns.hostname,
            seeds = self.book.len(),
            "seeder started"
        );
    }

    fn spawn_crawler(&self) {
        let crawler_config = self.config.crawler.crawler_config();
        let client = Arc::new(PeerClient::new(
            self.config.network,
            crawler_config.handshake_timeout,
            crawler_config.getaddr_timeout,
        ));
        let crawler = Crawler::new(self.book.clone(), client, crawler_config);

        self.task_tracker
            .spawn(crawler.run(self.cancellation.clone()));
    }

    fn spawn_reconciler(&self) {
        let reconciler = Reconciler::new(
            self.book.clone(),
            self.sink.clone(),
            self.config
                .dns
                .reconciler_config(self.config.crawler.service_mask),
        );

        self.task_tracker
            .spawn(reconciler.run(self.cancellation.clone()));
    }

    pub async fn shutdown(&self) {
        info!("Shutting down seeder, waiting for in-flight crawls...");

        self.cancellation.cancel();

        let timeout = self
            .config
            .shutdown_timeout
            .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS);

        select! {
            // Wait until all services are finished
            _ = self.task_tracker.wait() => {},
            // Or exit by timeout
            _ = sleep(Duration::from_secs(timeout)) => {
                info!("Shutdown timeout reached, exiting...");
            },
        }
    }
}
