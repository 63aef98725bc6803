//! Peer identifiers

use crate::validation::{ValidationError, validate_peer_id};
use std::fmt;
use std::str::FromStr;

/// Validated identifier of a remote peer
///
/// Peers are addressed by an opaque string: a numeric device id, an alias
/// or a `host:port` pair. Only the character set and length are checked
/// here; resolving the id is the connector's job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(String);

impl PeerId {
    /// Validate and wrap a peer identifier
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        validate_peer_id(&id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PeerId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for PeerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_common_forms() {
        for id in ["123456789", "peer-42", "office_pc", "10.0.0.5:21118", "me@home.lan"] {
            assert!(PeerId::new(id).is_ok(), "{id} should be valid");
        }
    }

    #[test]
    fn test_display_round_trip() {
        let peer: PeerId = "peer-42".parse().unwrap();
        assert_eq!(peer.to_string(), "peer-42");
        assert_eq!(peer.as_str(), "peer-42");
    }
}
