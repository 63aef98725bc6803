//! Length-prefixed TCP transport
//!
//! Each message is a 4-byte little-endian length followed by the payload.

use crate::{Connector, Transport, TransportError};
use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use remdesk_protocol::PeerId;
use std::collections::HashMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

/// Maximum message size accepted on the wire (8MB)
pub const MAX_MESSAGE_SIZE: usize = 8 << 20;

/// Message framing over any byte stream
pub struct FramedTransport<S> {
    stream: S,
    buffer: BytesMut,
}

impl<S> FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(8 * 1024),
        }
    }

    /// Split a complete message off the read buffer, if one is there
    fn take_message(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        if self.buffer.len() < 4 {
            return Ok(None);
        }

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&self.buffer[..4]);
        let len = u32::from_le_bytes(len_bytes) as usize;

        if len > MAX_MESSAGE_SIZE {
            return Err(TransportError::FrameTooLarge {
                size: len,
                max: MAX_MESSAGE_SIZE,
            });
        }

        if self.buffer.len() < 4 + len {
            return Ok(None);
        }

        self.buffer.advance(4);
        Ok(Some(self.buffer.split_to(len).to_vec()))
    }
}

#[async_trait]
impl<S> Transport for FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, message: Vec<u8>) -> Result<(), TransportError> {
        if message.len() > MAX_MESSAGE_SIZE {
            return Err(TransportError::FrameTooLarge {
                size: message.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        trace!("Sending message: {} bytes", message.len());

        let mut framed = Vec::with_capacity(4 + message.len());
        framed.extend_from_slice(&(message.len() as u32).to_le_bytes());
        framed.extend_from_slice(&message);

        self.stream
            .write_all(&framed)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.stream
            .flush()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        loop {
            if let Some(message) = self.take_message()? {
                trace!("Received message: {} bytes", message.len());
                return Ok(message);
            }

            // read_buf keeps partial data in self.buffer, so this is cancel safe
            let n = self
                .stream
                .read_buf(&mut self.buffer)
                .await
                .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;

            if n == 0 {
                return Err(TransportError::ConnectionClosed);
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        debug!("Closing framed transport");
        self.stream
            .shutdown()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}

/// TCP connector configuration
#[derive(Debug, Clone, Default)]
pub struct TcpConnectorConfig {
    /// Static directory: peer id -> "host:port"
    pub directory: HashMap<String, String>,
}

/// Connects to peers over plain TCP
///
/// Peers are looked up in the directory first; otherwise an id of the form
/// `host:port` is dialled directly.
pub struct TcpConnector {
    config: TcpConnectorConfig,
}

impl TcpConnector {
    pub fn new(config: TcpConnectorConfig) -> Self {
        Self { config }
    }

    /// Resolve a peer id to a dialable address
    pub fn resolve(&self, peer: &PeerId) -> Result<String, TransportError> {
        if let Some(addr) = self.config.directory.get(peer.as_str()) {
            return Ok(addr.clone());
        }

        match peer.as_str().rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(peer.as_str().to_string())
            }
            _ => Err(TransportError::Unresolvable(peer.to_string())),
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, peer: &PeerId) -> Result<Box<dyn Transport>, TransportError> {
        let addr = self.resolve(peer)?;
        debug!("Connecting to {} at {}", peer, addr);

        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", addr, e)))?;
        stream
            .set_nodelay(true)
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        Ok(Box::new(FramedTransport::new(stream)))
    }
}
