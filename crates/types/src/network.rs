use core::fmt::Display;
use core::str::FromStr;

use bitcoin::network::Magic;
use serde::{Deserialize, Serialize};

/// Flokicoin mainnet network magic.
const MAINNET_MAGIC: [u8; 4] = [0xfb, 0xc0, 0xb6, 0xdb];
/// Flokicoin testnet network magic.
const TESTNET_MAGIC: [u8; 4] = [0xfd, 0xd2, 0xc8, 0xf1];
/// Flokicoin regtest network magic.
const REGTEST_MAGIC: [u8; 4] = [0xfa, 0xbf, 0xb5, 0xda];

/// Protocol version the seeder advertises during the handshake.
pub const PROTOCOL_VERSION: u32 = 70015;

/// User agent the seeder advertises during the handshake.
pub const USER_AGENT: &str = "/flokicoin-seeder:0.1.0/";

/// Flokicoin network flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl Network {
    /// The wire magic that prefixes every message on this network.
    pub fn magic(&self) -> Magic {
        match self {
            Network::Mainnet => Magic::from_bytes(MAINNET_MAGIC),
            Network::Testnet => Magic::from_bytes(TESTNET_MAGIC),
            Network::Regtest => Magic::from_bytes(REGTEST_MAGIC),
        }
    }

    /// The port peers listen on by default.
    pub fn default_port(&self) -> u16 {
        match self {
            Network::Mainnet => 15212,
            Network::Testnet => 25212,
            Network::Regtest => 35212,
        }
    }
}

impl<'de> serde::Deserialize<'de> for Network {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        Network::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl FromStr for Network {
    type Err = NetworkParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            "regtest" => Ok(Self::Regtest),
            _ => Err(NetworkParseError::UnknownType),
        }
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
            Network::Regtest => write!(f, "regtest"),
        }
    }
}

#[derive(Debug)]
pub enum NetworkParseError {
    UnknownType,
}

impl Display for NetworkParseError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            NetworkParseError::UnknownType => write!(f, "Unknown network type"),
        }
    }
}

impl std::error::Error for NetworkParseError {}
