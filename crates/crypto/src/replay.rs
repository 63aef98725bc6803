//! Seen-nonce window for the session handshake

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::time::{Duration, Instant};

/// Remembers nonces for a fixed window so a signed request cannot be
/// presented twice.
pub struct ReplayCache {
    /// nonce -> end of its window
    seen: DashMap<[u8; 32], Instant>,
    window: Duration,
}

impl ReplayCache {
    pub fn new(window: Duration) -> Self {
        Self {
            seen: DashMap::new(),
            window,
        }
    }

    /// Record `nonce`; returns false if it is still inside its window
    pub fn check_and_insert(&self, nonce: &[u8; 32]) -> bool {
        let now = Instant::now();
        match self.seen.entry(*nonce) {
            Entry::Occupied(entry) if *entry.get() > now => false,
            Entry::Occupied(mut entry) => {
                entry.insert(now + self.window);
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(now + self.window);
                true
            }
        }
    }

    /// Forget nonces whose window has passed; returns how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.seen.len();
        self.seen.retain(|_, until| *until > now);
        before.saturating_sub(self.seen.len())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_use_is_rejected() {
        let cache = ReplayCache::new(Duration::from_secs(60));
        let nonce = [7u8; 32];

        assert!(cache.check_and_insert(&nonce));
        assert!(!cache.check_and_insert(&nonce));
        assert!(cache.check_and_insert(&[8u8; 32]));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_window_expiry() {
        let cache = ReplayCache::new(Duration::from_millis(10));
        let nonce = [42u8; 32];
        cache.check_and_insert(&nonce);

        std::thread::sleep(Duration::from_millis(20));

        // An expired nonce is accepted again and restarts its window
        assert!(cache.check_and_insert(&nonce));
        assert!(!cache.check_and_insert(&nonce));

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }
}
