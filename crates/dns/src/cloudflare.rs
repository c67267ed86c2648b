use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::warn;

use crate::sink::{RecordSink, SinkError};

const API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// TTL of the published seed records, in seconds. Short on purpose: clients
/// should not cache a peer that may be gone in minutes.
const RECORD_TTL: u32 = 120;

/// Deadline for one API call.
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Cloudflare error code for "an identical record already exists".
const RECORD_EXISTS_CODE: u64 = 81057;

#[derive(Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiError>,
    result: Option<T>,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    code: u64,
    message: String,
}

#[derive(Deserialize)]
struct Zone {
    id: String,
}

#[derive(Deserialize)]
struct DnsRecord {
    id: String,
    content: String,
}

/// Record sink backed by the Cloudflare DNS API.
pub struct CloudflareSink {
    http: reqwest::Client,
    zone: String,
    hostname: String,
    cache: Mutex<HashSet<Ipv4Addr>>,
}

impl CloudflareSink {
    /// Authenticate with an API token and resolve the zone that owns
    /// `hostname`. Fails fast on a bad token or an unmanaged domain.
    pub async fn new(api_token: &str, hostname: &str) -> Result<Self, SinkError> {
        let mut auth = header::HeaderValue::from_str(&format!("Bearer {api_token}"))
            .map_err(|_| SinkError::Auth)?;
        auth.set_sensitive(true);

        let mut headers = header::HeaderMap::new();
        headers.insert(header::AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .default_headers(headers)
            .build()?;

        let zone = resolve_zone(&http, hostname).await?;

        Ok(Self {
            http,
            zone,
            hostname: hostname.to_string(),
            cache: Mutex::new(HashSet::new()),
        })
    }

    /// The published A records on the seed hostname, optionally narrowed to
    /// those pointing at `content`.
    async fn records(&self, content: Option<Ipv4Addr>) -> Result<Vec<DnsRecord>, SinkError> {
        let mut request = self
            .http
            .get(format!("{API_BASE}/zones/{}/dns_records", self.zone))
            .query(&[
                ("type", "A"),
                ("name", self.hostname.as_str()),
                ("per_page", "500"),
            ]);
        if let Some(ip) = content {
            request = request.query(&[("content", ip.to_string())]);
        }

        let envelope: Envelope<Vec<DnsRecord>> =
            check_status(request.send().await?)?.json().await?;
        if !envelope.success {
            return Err(SinkError::Api(describe(&envelope.errors)));
        }

        Ok(envelope.result.unwrap_or_default())
    }
}

#[async_trait]
impl RecordSink for CloudflareSink {
    async fn add(&self, ip: Ipv4Addr) -> Result<(), SinkError> {
        let record = serde_json::json!({
            "type": "A",
            "name": self.hostname,
            "content": ip.to_string(),
            "ttl": RECORD_TTL,
        });

        let response = self
            .http
            .post(format!("{API_BASE}/zones/{}/dns_records", self.zone))
            .json(&record)
            .send()
            .await?;

        let envelope: Envelope<DnsRecord> = check_status(response)?.json().await?;
        if !envelope.success && !already_exists(&envelope.errors) {
            return Err(SinkError::Api(describe(&envelope.errors)));
        }

        self.cache.lock().await.insert(ip);
        Ok(())
    }

    async fn delete(&self, ip: Ipv4Addr) -> Result<(), SinkError> {
        let records = self.records(Some(ip)).await?;

        // An absent record is already the state we want.
        let mut all_deleted = true;
        for record in records {
            let url = format!("{API_BASE}/zones/{}/dns_records/{}", self.zone, record.id);
            match self.http.delete(url).send().await {
                Ok(response) => {
                    let envelope: Envelope<serde_json::Value> =
                        check_status(response)?.json().await?;
                    if !envelope.success {
                        warn!(%ip, "failed to delete record: {}", describe(&envelope.errors));
                        all_deleted = false;
                    }
                }
                Err(err) => {
                    warn!(%ip, %err, "failed to delete record");
                    all_deleted = false;
                }
            }
        }

        // A failed deletion stays in the cache so the next cycle retries it.
        if all_deleted {
            self.cache.lock().await.remove(&ip);
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Ipv4Addr>, SinkError> {
        let records = self.records(None).await?;
        let ips: Vec<Ipv4Addr> = records
            .iter()
            .filter_map(|record| record.content.parse().ok())
            .collect();

        let mut cache = self.cache.lock().await;
        *cache = ips.iter().copied().collect();

        Ok(ips)
    }

    async fn addresses(&self) -> HashSet<Ipv4Addr> {
        self.cache.lock().await.clone()
    }
}

/// Find the zone that owns `hostname` by walking up its labels: the zone for
/// `dnsseed.flokicoin.org` is usually `flokicoin.org`, but a token may also
/// be scoped to the full name.
async fn resolve_zone(http: &reqwest::Client, hostname: &str) -> Result<String, SinkError> {
    let labels: Vec<&str> = hostname.split('.').filter(|l| !l.is_empty()).collect();

    if labels.len() >= 2 {
        for start in 0..=labels.len() - 2 {
            let candidate = labels[start..].join(".");
            let response = http
                .get(format!("{API_BASE}/zones"))
                .query(&[("name", candidate.as_str())])
                .send()
                .await?;

            let envelope: Envelope<Vec<Zone>> = check_status(response)?.json().await?;
            if let Some(zone) = envelope.result.unwrap_or_default().into_iter().next() {
                return Ok(zone.id);
            }
        }
    }

    Err(SinkError::ZoneNotFound(hostname.to_string()))
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SinkError> {
    match response.status() {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SinkError::Auth),
        _ => Ok(response),
    }
}

fn already_exists(errors: &[ApiError]) -> bool {
    errors.iter().any(|e| {
        e.code == RECORD_EXISTS_CODE || e.message.contains("identical record already exists")
    })
}

/// Human-readable summary of an error reply. The API is allowed to fail
/// without reporting a cause; that must not panic the caller.
fn describe(errors: &[ApiError]) -> String {
    if errors.is_empty() {
        return "request failed without a reported cause".to_string();
    }
    errors
        .iter()
        .map(|e| format!("{} (code {})", e.message, e.code))
        .collect::<Vec<_>>()
        .join("; ")
}
