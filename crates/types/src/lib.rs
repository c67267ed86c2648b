mod network;
pub use network::{Network, NetworkParseError, PROTOCOL_VERSION, USER_AGENT};

mod gossip;
pub use gossip::GossipAddr;
