use config::Config;
use serde::Deserialize;

use flokiseed_types::Network;

use std::path::PathBuf;

mod crawler;
pub use crawler::CrawlerSection;

mod dns;
pub use dns::DnsSection;

mod logger;
pub use logger::LoggerConfig;

#[derive(Debug, Deserialize)]
pub struct SeederConfig {
    #[serde(default = "default_network")]
    pub network: Network,

    pub crawler: CrawlerSection,
    pub dns: DnsSection,

    #[serde(default)]
    pub shutdown_timeout: Option<u64>,

    #[serde(default)]
    pub logger: LoggerConfig,
}

fn default_network() -> Network {
    Network::Mainnet
}

impl SeederConfig {
    /// Load and validate the config file. Anything wrong here is fatal:
    /// the daemon must not enter the crawl loop half-configured.
    pub fn from_path(path: PathBuf) -> eyre::Result<Self> {
        if !path.exists() {
            eyre::bail!("config file {} does not exist", path.display());
        }

        let config: Self = Config::builder()
            .add_source(config::File::from(path))
            .build()?
            .try_deserialize()?;

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> eyre::Result<()> {
        if self.crawler.seeds.is_empty() {
            eyre::bail!("`crawler.seeds` must list at least one endpoint");
        }
        if self.dns.hostname.is_empty() {
            eyre::bail!("`dns.hostname` must name the zone entry to serve");
        }
        if self.dns.api_token.is_empty() {
            eyre::bail!("`dns.api_token` is required to manage records");
        }

        Ok(())
    }
}
