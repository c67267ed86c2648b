//! Addresses learned from peer gossip.

use std::net::{IpAddr, SocketAddr};

use bitcoin::network::constants::ServiceFlags;

/// One peer address learned from another peer's `addr`/`addrv2` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GossipAddr {
    pub ip: IpAddr,
    pub port: u16,
    /// Services the gossiping peer claims this address provides. Unverified
    /// until we handshake with the address ourselves.
    pub services: ServiceFlags,
}

impl GossipAddr {
    pub fn new(ip: IpAddr, port: u16, services: ServiceFlags) -> Self {
        Self { ip, port, services }
    }

    /// The canonical `ip:port` form used to key the address book.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    /// Whether this address is worth dialing from the open internet.
    /// Loopback, link-local, multicast and unspecified addresses are not.
    pub fn is_routable(&self) -> bool {
        if self.port == 0 {
            return false;
        }

        match self.ip {
            IpAddr::V4(ip) => {
                !(ip.is_loopback()
                    || ip.is_link_local()
                    || ip.is_multicast()
                    || ip.is_unspecified()
                    || ip.is_broadcast())
            }
            IpAddr::V6(ip) => {
                // fe80::/10 is the link-local unicast range.
                let link_local = (ip.segments()[0] & 0xffc0) == 0xfe80;

                !(ip.is_loopback() || ip.is_multicast() || ip.is_unspecified() || link_local)
            }
        }
    }
}

impl From<SocketAddr> for GossipAddr {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port(), ServiceFlags::NONE)
    }
}
