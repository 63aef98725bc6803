//! Session authentication
//!
//! The runtime only needs the `Authenticator` seam; the pre-shared-key
//! implementation here is the default collaborator.

use crate::error::AuthError;
use async_trait::async_trait;
use remdesk_crypto::{ReplayCache, RequestSigner, random_nonce, unix_millis};
use remdesk_protocol::{AuthRequest, AuthResponse, PeerId, WireMessage};
use remdesk_transport::Transport;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Maximum clock skew accepted between client and peer (30 seconds)
pub const MAX_CLOCK_SKEW_MS: i64 = 30_000;

/// Seen-nonce count above which expired entries are swept
const NONCE_PURGE_THRESHOLD: usize = 1024;

/// Runs the credential exchange on a freshly opened transport
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(
        &self,
        peer: &PeerId,
        transport: &mut dyn Transport,
    ) -> Result<(), AuthError>;
}

pub type SharedAuthenticator = Arc<dyn Authenticator>;

fn signed_fields<'a>(
    client_id: &'a str,
    peer_id: &'a str,
    nonce: &'a [u8; 32],
    timestamp: &'a [u8; 8],
) -> [&'a [u8]; 4] {
    [client_id.as_bytes(), peer_id.as_bytes(), nonce, timestamp]
}

/// Client side: signs an `AuthRequest` with a pre-shared key
pub struct PresharedKeyAuthenticator {
    client_id: String,
    signer: RequestSigner,
}

impl PresharedKeyAuthenticator {
    pub fn new(client_id: impl Into<String>, key: impl Into<Vec<u8>>) -> Self {
        Self {
            client_id: client_id.into(),
            signer: RequestSigner::new(key),
        }
    }

    /// Build a signed request for `peer`
    pub fn request(&self, peer: &PeerId) -> Result<AuthRequest, AuthError> {
        let nonce = random_nonce();
        let timestamp = unix_millis();
        let signature = self.signer.sign(&signed_fields(
            &self.client_id,
            peer.as_str(),
            &nonce,
            &timestamp.to_le_bytes(),
        ))?;

        Ok(AuthRequest {
            client_id: self.client_id.clone(),
            peer_id: peer.to_string(),
            client_version: crate::VERSION.to_string(),
            nonce,
            timestamp,
            signature,
        })
    }
}

#[async_trait]
impl Authenticator for PresharedKeyAuthenticator {
    async fn authenticate(
        &self,
        peer: &PeerId,
        transport: &mut dyn Transport,
    ) -> Result<(), AuthError> {
        let request = self.request(peer)?;
        transport
            .send_message(&WireMessage::AuthRequest(request))
            .await?;

        match transport.recv_message().await? {
            WireMessage::AuthResponse(response) if response.accepted => {
                debug!("Peer {} accepted client {}", peer, self.client_id);
                Ok(())
            }
            WireMessage::AuthResponse(response) => Err(AuthError::Rejected(
                response
                    .reason
                    .unwrap_or_else(|| "no reason given".to_string()),
            )),
            other => Err(AuthError::Protocol(format!(
                "expected auth-response, got {}",
                other.kind()
            ))),
        }
    }
}

/// Peer side: checks requests signed by `PresharedKeyAuthenticator`
pub struct PresharedKeyVerifier {
    local_id: PeerId,
    signer: RequestSigner,
    nonce_cache: ReplayCache,
}

impl PresharedKeyVerifier {
    pub fn new(local_id: PeerId, key: impl Into<Vec<u8>>) -> Self {
        Self {
            local_id,
            signer: RequestSigner::new(key),
            nonce_cache: ReplayCache::new(Duration::from_millis(2 * MAX_CLOCK_SKEW_MS as u64)),
        }
    }

    /// Verify a request
    pub fn verify(&self, request: &AuthRequest) -> Result<(), AuthError> {
        if request.peer_id != self.local_id.as_str() {
            return Err(AuthError::Rejected(format!(
                "request addressed to {}, this is {}",
                request.peer_id, self.local_id
            )));
        }

        let drift = unix_millis() as i64 - request.timestamp as i64;
        if drift.abs() > MAX_CLOCK_SKEW_MS {
            return Err(AuthError::Rejected(format!("timestamp drift {}ms", drift)));
        }

        self.signer
            .verify(
                &signed_fields(
                    &request.client_id,
                    &request.peer_id,
                    &request.nonce,
                    &request.timestamp.to_le_bytes(),
                ),
                &request.signature,
            )
            .map_err(|_| AuthError::Rejected("invalid signature".to_string()))?;

        // Only burn the nonce once the signature is known to be good
        if !self.nonce_cache.check_and_insert(&request.nonce) {
            warn!("Replayed auth nonce from {}", request.client_id);
            return Err(AuthError::Rejected("nonce reused".to_string()));
        }
        if self.nonce_cache.len() > NONCE_PURGE_THRESHOLD {
            let purged = self.nonce_cache.purge_expired();
            debug!("Purged {} expired auth nonces", purged);
        }

        Ok(())
    }

    /// Verify the request and answer it on the transport
    pub async fn respond(
        &self,
        request: &AuthRequest,
        transport: &mut dyn Transport,
    ) -> Result<(), AuthError> {
        match self.verify(request) {
            Ok(()) => {
                transport
                    .send_message(&WireMessage::AuthResponse(AuthResponse::accept(
                        random_nonce().to_vec(),
                    )))
                    .await?;
                Ok(())
            }
            Err(e) => {
                let reason = match &e {
                    AuthError::Rejected(reason) => reason.clone(),
                    other => other.to_string(),
                };
                transport
                    .send_message(&WireMessage::AuthResponse(AuthResponse::reject(reason)))
                    .await?;
                Err(e)
            }
        }
    }
}
