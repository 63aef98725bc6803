//! SessionFrame - data-plane unit of an active session

use rkyv::{Archive, Deserialize, Serialize};

/// Data-plane frame exchanged once a session is active
///
/// The channel number multiplexes independent streams (video, input,
/// clipboard, ...) over one session; their meaning belongs to the data
/// plane, not to this crate.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[rkyv(compare(PartialEq), derive(Debug))]
pub struct SessionFrame {
    /// Logical channel within the session
    pub channel: u16,

    /// Per-direction sequence number, starting at 1
    pub sequence: u64,

    /// Payload data
    pub payload: Vec<u8>,

    /// CRC32 checksum of payload
    pub checksum: u32,
}

impl SessionFrame {
    /// Create a new frame, computing its checksum
    pub fn new(channel: u16, sequence: u64, payload: Vec<u8>) -> Self {
        let checksum = crc32fast::hash(&payload);
        Self {
            channel,
            sequence,
            payload,
            checksum,
        }
    }

    /// Verify the checksum
    pub fn verify_checksum(&self) -> bool {
        crc32fast::hash(&self.payload) == self.checksum
    }
}

/// Control messages
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[rkyv(compare(PartialEq), derive(Debug))]
pub enum ControlMessage {
    /// Keepalive ping
    Ping { nonce: u64 },

    /// Keepalive pong
    Pong { nonce: u64 },

    /// Orderly session close
    Close { reason: String },
}
