//! remdesk Transport - Network layer for remote sessions
//!
//! This crate provides:
//! - `Transport`: a reliable, message-oriented connection to one peer
//! - `Connector`: opens a `Transport` to a peer by identifier
//! - Frame codec for `WireMessage`
//! - TCP (length-prefixed) and WebSocket transports
//! - In-memory network for tests and embedding

mod codec;
mod memory;
mod tcp;
mod ws;

pub use codec::*;
pub use memory::*;
pub use tcp::*;
pub use ws::*;

use async_trait::async_trait;
use remdesk_protocol::{PeerId, WireMessage};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Cannot resolve peer {0}")]
    Unresolvable(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Reliable message connection to a single peer
///
/// `recv` must be cancel safe: the session loop races it against timers
/// and cancellation, and a dropped `recv` future must not lose data.
#[async_trait]
pub trait Transport: Send {
    /// Send one message
    async fn send(&mut self, message: Vec<u8>) -> Result<(), TransportError>;

    /// Receive the next message
    async fn recv(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Close the connection
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Encode and send a wire message
    async fn send_message(&mut self, message: &WireMessage) -> Result<(), TransportError> {
        let bytes = encode(message)?;
        self.send(bytes).await
    }

    /// Receive and decode a wire message
    async fn recv_message(&mut self) -> Result<WireMessage, TransportError> {
        let bytes = self.recv().await?;
        Ok(decode(&bytes)?)
    }
}

/// Opens transports to peers
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, peer: &PeerId) -> Result<Box<dyn Transport>, TransportError>;
}

pub type SharedConnector = Arc<dyn Connector>;
