//! remdesk Crypto - Signing helpers for the session handshake
//!
//! This crate provides:
//! - HMAC-SHA256 request signing with constant-time verification
//! - Random nonces and wall-clock timestamps
//! - Replay cache for nonce deduplication

mod hmac_auth;
mod nonce;
mod replay;

pub use hmac_auth::*;
pub use nonce::*;
pub use replay::*;
