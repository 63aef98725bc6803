//! Frame codec for encoding/decoding WireMessages

use remdesk_protocol::{WireMessage, validate_frame};
use rkyv::util::AlignedVec;
use thiserror::Error;
use tracing::trace;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(#[from] remdesk_protocol::ValidationError),

    #[error("Empty message")]
    Empty,
}

/// Serialize a WireMessage for transmission
pub fn encode(message: &WireMessage) -> Result<Vec<u8>, CodecError> {
    let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(message)
        .map_err(|e| CodecError::SerializationFailed(e.to_string()))?
        .to_vec();

    trace!("Encoded {} message: {} bytes", message.kind(), bytes.len());

    Ok(bytes)
}

/// Deserialize and validate a received WireMessage
pub fn decode(data: &[u8]) -> Result<WireMessage, CodecError> {
    if data.is_empty() {
        return Err(CodecError::Empty);
    }

    // Network buffers carry no alignment guarantee
    let mut aligned = AlignedVec::<16>::with_capacity(data.len());
    aligned.extend_from_slice(data);

    let message = rkyv::from_bytes::<WireMessage, rkyv::rancor::Error>(&aligned)
        .map_err(|e| CodecError::DeserializationFailed(e.to_string()))?;

    if let WireMessage::Frame(frame) = &message {
        validate_frame(frame)?;
    }

    trace!("Decoded {} message: {} bytes", message.kind(), data.len());

    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use remdesk_protocol::{ControlMessage, SessionFrame};

    #[test]
    fn test_control_round_trip() {
        let message = WireMessage::Control(ControlMessage::Close {
            reason: "user requested".to_string(),
        });

        let encoded = encode(&message).unwrap();
        assert_eq!(decode(&encoded).unwrap(), message);
    }

    #[test]
    fn test_decode_unaligned_buffer() {
        let message = WireMessage::Frame(SessionFrame::new(2, 7, vec![9; 33]));
        let encoded = encode(&message).unwrap();

        // Shift by one byte to break alignment
        let mut shifted = vec![0u8];
        shifted.extend_from_slice(&encoded);

        assert_eq!(decode(&shifted[1..]).unwrap(), message);
    }

    #[test]
    fn test_corrupt_checksum_rejected() {
        let mut frame = SessionFrame::new(0, 1, vec![1, 2, 3]);
        frame.checksum ^= 1;
        let encoded = encode(&WireMessage::Frame(frame)).unwrap();

        assert!(matches!(decode(&encoded), Err(CodecError::InvalidFrame(_))));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(decode(&[]), Err(CodecError::Empty)));
        assert!(decode(b"definitely not rkyv").is_err());
    }
}
