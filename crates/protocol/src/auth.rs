//! Authentication structures

use rkyv::{Archive, Deserialize, Serialize};

/// Authentication request from client
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[rkyv(derive(Debug))]
pub struct AuthRequest {
    /// Identifier of the connecting client
    pub client_id: String,

    /// Peer the client believes it is talking to
    pub peer_id: String,

    /// Client software version
    pub client_version: String,

    /// Random nonce (replay protection)
    pub nonce: [u8; 32],

    /// Request timestamp (milliseconds)
    pub timestamp: u64,

    /// HMAC-SHA256 over client_id, peer_id, nonce and timestamp
    pub signature: [u8; 32],
}

/// Authentication response from the peer
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[rkyv(derive(Debug))]
pub struct AuthResponse {
    /// Whether the peer accepted the session
    pub accepted: bool,

    /// Rejection reason, if any
    pub reason: Option<String>,

    /// Opaque token for the data plane
    pub session_token: Vec<u8>,
}

impl AuthResponse {
    /// Accept with the given data-plane token
    pub fn accept(session_token: Vec<u8>) -> Self {
        Self {
            accepted: true,
            reason: None,
            session_token,
        }
    }

    /// Reject with a human readable reason
    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: Some(reason.into()),
            session_token: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_carries_reason() {
        let response = AuthResponse::reject("bad credentials");
        assert!(!response.accepted);
        assert_eq!(response.reason.as_deref(), Some("bad credentials"));
        assert!(response.session_token.is_empty());
    }

    #[test]
    fn test_accept() {
        let response = AuthResponse::accept(vec![7; 4]);
        assert!(response.accepted);
        assert!(response.reason.is_none());
    }
}
