use std::collections::HashSet;
use std::net::Ipv4Addr;

use async_trait::async_trait;

/// The error type for record-sink operations.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("authentication rejected by the DNS provider")]
    Auth,

    #[error("no managed zone found for {0}")]
    ZoneNotFound(String),

    #[error("DNS provider error: {0}")]
    Api(String),

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A store of A records on the managed seed hostname.
///
/// Both mutations are idempotent: adding a record that already exists and
/// deleting one that is absent are successes.
#[async_trait]
pub trait RecordSink {
    /// Publish an A record pointing at `ip`.
    async fn add(&self, ip: Ipv4Addr) -> Result<(), SinkError>;

    /// Remove every A record whose content equals `ip`.
    async fn delete(&self, ip: Ipv4Addr) -> Result<(), SinkError>;

    /// Fetch the currently published record set from the provider.
    async fn list(&self) -> Result<Vec<Ipv4Addr>, SinkError>;

    /// The sink's local view of the published set. May lag `list` by one
    /// reconcile cycle.
    async fn addresses(&self) -> HashSet<Ipv4Addr>;
}

#[cfg(any(test, feature = "mocks"))]
mockall::mock! {
    pub RecordSink { }

    #[async_trait]
    impl RecordSink for RecordSink {
        async fn add(&self, ip: Ipv4Addr) -> Result<(), SinkError>;
        async fn delete(&self, ip: Ipv4Addr) -> Result<(), SinkError>;
        async fn list(&self) -> Result<Vec<Ipv4Addr>, SinkError>;
        async fn addresses(&self) -> HashSet<Ipv4Addr>;
    }
}
