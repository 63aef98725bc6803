//! Nonces and timestamps for the handshake

use rand::RngCore;
use rand::rngs::OsRng;
use std::time::{SystemTime, UNIX_EPOCH};

/// Fresh 32-byte nonce from the OS RNG
pub fn random_nonce() -> [u8; 32] {
    let mut nonce = [0u8; 32];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Milliseconds since the Unix epoch (0 if the clock is before it)
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonces_differ() {
        assert_ne!(random_nonce(), random_nonce());
    }

    #[test]
    fn test_clock_is_after_2020() {
        assert!(unix_millis() > 1_577_836_800_000);
    }
}
