use std::time::Duration;

use bitcoin::network::constants::ServiceFlags;
use serde::Deserialize;

use flokiseed_dns::ReconcilerConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct DnsSection {
    /// The DNS name whose A records the seeder maintains.
    pub hostname: String,

    /// API token with edit access to the hostname's zone.
    pub api_token: String,

    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,

    /// How recently a node must have answered to stay published.
    #[serde(default = "default_good_ttl_secs")]
    pub good_ttl_secs: u64,

    /// Cap on adds (and deletes) per reconcile cycle.
    #[serde(default = "default_max_changes_per_cycle")]
    pub max_changes_per_cycle: usize,
}

fn default_reconcile_interval_secs() -> u64 {
    10 * 60
}

fn default_good_ttl_secs() -> u64 {
    60 * 60
}

fn default_max_changes_per_cycle() -> usize {
    50
}

impl DnsSection {
    pub fn reconciler_config(&self, service_mask: u64) -> ReconcilerConfig {
        ReconcilerConfig {
            interval: Duration::from_secs(self.reconcile_interval_secs),
            good_ttl: Duration::from_secs(self.good_ttl_secs),
            max_changes_per_cycle: self.max_changes_per_cycle,
            required_services: ServiceFlags::from(service_mask),
        }
    }
}
