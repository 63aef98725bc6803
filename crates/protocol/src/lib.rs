//! remdesk Protocol - Wire messages and validation
//!
//! This crate defines the data exchanged with a remote peer:
//! - `WireMessage`: the envelope carried by every transport message
//! - `AuthRequest`/`AuthResponse`: session authentication handshake
//! - `SessionFrame`: data-plane payloads of an active session
//! - `ControlMessage`: keepalive and close signalling
//! - `PeerId`: validated peer identifier
//!
//! All structures use rkyv for serialization.

mod auth;
mod frame;
mod peer;
mod validation;

pub use auth::*;
pub use frame::*;
pub use peer::*;
pub use validation::*;

use rkyv::{Archive, Deserialize, Serialize};

/// Envelope for everything sent over a transport
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[rkyv(derive(Debug))]
pub enum WireMessage {
    /// Client -> peer authentication request
    AuthRequest(AuthRequest),

    /// Peer -> client authentication verdict
    AuthResponse(AuthResponse),

    /// Data-plane frame
    Frame(SessionFrame),

    /// Out-of-band control message
    Control(ControlMessage),
}

impl WireMessage {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            WireMessage::AuthRequest(_) => "auth-request",
            WireMessage::AuthResponse(_) => "auth-response",
            WireMessage::Frame(_) => "frame",
            WireMessage::Control(_) => "control",
        }
    }
}
