use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bitcoin::network::address::{AddrV2, Address};
use bitcoin::network::constants::ServiceFlags;
use bitcoin::network::message::NetworkMessage;
use bitcoin::network::message_network::VersionMessage;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

use flokiseed_types::{GossipAddr, Network, PROTOCOL_VERSION, USER_AGENT};

use crate::crawl::{CrawlClient, CrawlError, CrawlReport};
use crate::wire::Connection;

/// Outbound crawl client speaking the Flokicoin wire protocol.
pub struct PeerClient {
    network: Network,
    handshake_timeout: Duration,
    getaddr_timeout: Duration,
}

impl PeerClient {
    pub fn new(network: Network, handshake_timeout: Duration, getaddr_timeout: Duration) -> Self {
        Self {
            network,
            handshake_timeout,
            getaddr_timeout,
        }
    }

    /// Exchange `version`/`verack` with the remote node. Ignores the other
    /// pre-verack chatter (`sendaddrv2`, `wtxidrelay`, ...) modern nodes emit
    /// and answers pings, but insists on a `version` before the `verack`.
    async fn handshake(
        &self,
        conn: &mut Connection,
        addr: SocketAddr,
    ) -> Result<VersionMessage, CrawlError> {
        conn.send(NetworkMessage::Version(version_message(addr)))
            .await
            .map_err(proto_err)?;
        conn.send(NetworkMessage::SendAddrV2)
            .await
            .map_err(proto_err)?;

        let mut remote: Option<VersionMessage> = None;
        loop {
            match conn.read().await.map_err(proto_err)? {
                NetworkMessage::Version(version) => {
                    trace!(%addr, version = version.version, "remote version");
                    remote = Some(version);
                }
                NetworkMessage::Verack => match remote {
                    Some(version) => {
                        conn.send(NetworkMessage::Verack).await.map_err(proto_err)?;
                        return Ok(version);
                    }
                    None => {
                        return Err(CrawlError::Protocol("verack before version".into()));
                    }
                },
                NetworkMessage::Ping(nonce) => {
                    conn.send(NetworkMessage::Pong(nonce))
                        .await
                        .map_err(proto_err)?;
                }
                other => {
                    trace!(%addr, command = other.cmd(), "ignoring pre-verack message");
                }
            }
        }
    }

    /// Ask for the peer's address list and wait for one batch. A peer that
    /// stays quiet is not an error: the handshake already proved liveness.
    async fn harvest(&self, conn: &mut Connection) -> Result<Vec<GossipAddr>, CrawlError> {
        conn.send(NetworkMessage::GetAddr)
            .await
            .map_err(|_| CrawlError::GetAddrTimeout)?;

        let deadline = Instant::now() + self.getaddr_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Vec::new());
            }

            let message = match timeout(remaining, conn.read()).await {
                Err(_elapsed) => return Ok(Vec::new()),
                Ok(Err(_)) => return Err(CrawlError::GetAddrTimeout),
                Ok(Ok(message)) => message,
            };

            match message {
                NetworkMessage::Addr(addrs) => {
                    return Ok(addrs
                        .iter()
                        .filter_map(|(_, addr)| from_legacy(addr))
                        .collect());
                }
                NetworkMessage::AddrV2(addrs) => {
                    return Ok(addrs
                        .iter()
                        .filter_map(|msg| {
                            // Tor, I2P and other overlay addresses cannot be
                            // published as A records, nor dialed directly.
                            let ip = match &msg.addr {
                                AddrV2::Ipv4(ip) => IpAddr::V4(*ip),
                                AddrV2::Ipv6(ip) => IpAddr::V6(*ip),
                                _ => return None,
                            };
                            Some(GossipAddr::new(ip, msg.port, msg.services))
                        })
                        .collect());
                }
                NetworkMessage::Ping(nonce) => {
                    conn.send(NetworkMessage::Pong(nonce))
                        .await
                        .map_err(|_| CrawlError::GetAddrTimeout)?;
                }
                other => {
                    trace!(command = other.cmd(), "ignoring message while harvesting");
                }
            }
        }
    }
}

#[async_trait]
impl CrawlClient for PeerClient {
    async fn crawl(
        &self,
        addr: SocketAddr,
        skip_getaddr: bool,
    ) -> Result<CrawlReport, CrawlError> {
        let stream = timeout(self.handshake_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                CrawlError::Dial(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "connect timed out",
                ))
            })?
            .map_err(CrawlError::Dial)?;

        let mut conn = Connection::new(stream, self.network.magic());

        let version = timeout(self.handshake_timeout, self.handshake(&mut conn, addr))
            .await
            .map_err(|_| CrawlError::HandshakeTimeout)??;

        let addresses = if skip_getaddr {
            Vec::new()
        } else {
            self.harvest(&mut conn).await?
        };

        // Dropping `conn` closes the socket on every return path.
        Ok(CrawlReport {
            protocol_version: version.version,
            services: version.services,
            user_agent: version.user_agent,
            last_block: version.start_height,
            addresses,
        })
    }
}

fn proto_err(err: impl Display) -> CrawlError {
    CrawlError::Protocol(err.to_string())
}

fn from_legacy(addr: &Address) -> Option<GossipAddr> {
    let socket = addr.socket_addr().ok()?;
    Some(GossipAddr::new(socket.ip(), socket.port(), addr.services))
}

fn version_message(peer: SocketAddr) -> VersionMessage {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|t| t.as_secs() as i64)
        .unwrap_or_default();
    let unroutable = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);

    VersionMessage {
        version: PROTOCOL_VERSION,
        services: ServiceFlags::NONE,
        timestamp,
        receiver: Address::new(&peer, ServiceFlags::NONE),
        sender: Address::new(&unroutable, ServiceFlags::NONE),
        nonce: fastrand::u64(..),
        user_agent: USER_AGENT.to_string(),
        start_height: 0,
        relay: false,
    }
}
