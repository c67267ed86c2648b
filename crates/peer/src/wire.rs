//! Framed message transport over one TCP connection.

use std::io;

use bitcoin::consensus::encode;
use bitcoin::network::message::{NetworkMessage, RawNetworkMessage};
use bitcoin::network::Magic;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Magic (4) + command (12) + payload length (4) + checksum (4).
const HEADER_SIZE: usize = 24;

/// Upper bound on a single payload. A full `addr` batch is well under this.
const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

pub(crate) struct Connection {
    stream: TcpStream,
    magic: Magic,
}

impl Connection {
    pub(crate) fn new(stream: TcpStream, magic: Magic) -> Self {
        Self { stream, magic }
    }

    pub(crate) async fn send(&mut self, payload: NetworkMessage) -> io::Result<()> {
        let raw = RawNetworkMessage {
            magic: self.magic,
            payload,
        };
        self.stream.write_all(&encode::serialize(&raw)).await
    }

    pub(crate) async fn read(&mut self) -> io::Result<NetworkMessage> {
        let mut header = [0u8; HEADER_SIZE];
        self.stream.read_exact(&mut header).await?;

        if header[..4] != self.magic.to_bytes() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "message from a different network",
            ));
        }

        let len = u32::from_le_bytes([header[16], header[17], header[18], header[19]]) as usize;
        if len > MAX_PAYLOAD_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("oversized payload of {len} bytes"),
            ));
        }

        let mut frame = vec![0u8; HEADER_SIZE + len];
        frame[..HEADER_SIZE].copy_from_slice(&header);
        self.stream.read_exact(&mut frame[HEADER_SIZE..]).await?;

        let raw: RawNetworkMessage = encode::deserialize(&frame)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        Ok(raw.payload)
    }
}
