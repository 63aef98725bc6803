//! Peer id and frame validation

use crate::frame::SessionFrame;
use thiserror::Error;

/// Validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Peer id is empty")]
    EmptyPeerId,

    #[error("Peer id too long: {len} bytes (max: {max})")]
    PeerIdTooLong { len: usize, max: usize },

    #[error("Peer id contains invalid character {0:?}")]
    InvalidPeerIdChar(char),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("Payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

/// Maximum peer id length in bytes
pub const MAX_PEER_ID_LEN: usize = 128;

/// Maximum allowed frame payload size (1MB)
pub const MAX_PAYLOAD_SIZE: usize = 1 << 20;

/// Validate a peer identifier
pub fn validate_peer_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::EmptyPeerId);
    }

    if id.len() > MAX_PEER_ID_LEN {
        return Err(ValidationError::PeerIdTooLong {
            len: id.len(),
            max: MAX_PEER_ID_LEN,
        });
    }

    if let Some(c) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '@')))
    {
        return Err(ValidationError::InvalidPeerIdChar(c));
    }

    Ok(())
}

/// Validate a received SessionFrame
pub fn validate_frame(frame: &SessionFrame) -> Result<(), ValidationError> {
    if frame.payload.len() > MAX_PAYLOAD_SIZE {
        return Err(ValidationError::PayloadTooLarge {
            size: frame.payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let computed = crc32fast::hash(&frame.payload);
    if computed != frame.checksum {
        return Err(ValidationError::ChecksumMismatch {
            expected: frame.checksum,
            actual: computed,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_peer_id() {
        assert_eq!(validate_peer_id(""), Err(ValidationError::EmptyPeerId));
    }

    #[test]
    fn test_peer_id_too_long() {
        let id = "a".repeat(MAX_PEER_ID_LEN + 1);
        assert!(matches!(
            validate_peer_id(&id),
            Err(ValidationError::PeerIdTooLong { .. })
        ));
    }

    #[test]
    fn test_peer_id_rejects_whitespace_and_unicode() {
        assert_eq!(
            validate_peer_id("peer 42"),
            Err(ValidationError::InvalidPeerIdChar(' '))
        );
        assert_eq!(
            validate_peer_id("pe\u{FFFD}r"),
            Err(ValidationError::InvalidPeerIdChar('\u{FFFD}'))
        );
    }

    #[test]
    fn test_valid_frame() {
        let frame = SessionFrame::new(0, 1, vec![1, 2, 3]);
        assert!(validate_frame(&frame).is_ok());
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut frame = SessionFrame::new(0, 1, vec![1, 2, 3]);
        frame.checksum = 0xDEADBEEF;

        let result = validate_frame(&frame);
        assert!(matches!(result, Err(ValidationError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_payload_too_large() {
        let frame = SessionFrame::new(0, 1, vec![0u8; MAX_PAYLOAD_SIZE + 1]);

        let result = validate_frame(&frame);
        assert!(matches!(result, Err(ValidationError::PayloadTooLarge { .. })));
    }
}
