//! Error kinds surfaced to the host application

use remdesk_crypto::HmacError;
use remdesk_transport::TransportError;
use std::fmt;
use thiserror::Error;

/// Failure categories reported across the runtime boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The runtime handle has been cleaned up (or is null over FFI)
    InvalidHandle,
    /// The peer identifier failed validation
    InvalidPeerId,
    /// A live session to the same peer already exists
    DuplicateSession,
    /// No session with the given id
    UnknownSession,
    /// The runtime is at its session limit
    RegistryFull,
    /// The transport could not be opened or broke
    TransportError,
    /// The peer refused the credentials or broke the handshake
    AuthRejected,
    /// A state exceeded its dwell time
    Timeout,
}

impl ErrorKind {
    /// Stable negative code used by the C ABI
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::InvalidHandle => -1,
            ErrorKind::InvalidPeerId => -2,
            ErrorKind::DuplicateSession => -3,
            ErrorKind::UnknownSession => -4,
            ErrorKind::RegistryFull => -5,
            ErrorKind::TransportError => -6,
            ErrorKind::AuthRejected => -7,
            ErrorKind::Timeout => -8,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidHandle => "InvalidHandle",
            ErrorKind::InvalidPeerId => "InvalidPeerId",
            ErrorKind::DuplicateSession => "DuplicateSession",
            ErrorKind::UnknownSession => "UnknownSession",
            ErrorKind::RegistryFull => "RegistryFull",
            ErrorKind::TransportError => "TransportError",
            ErrorKind::AuthRejected => "AuthRejected",
            ErrorKind::Timeout => "Timeout",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error: a kind plus a human readable message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct SessionError {
    kind: ErrorKind,
    message: String,
}

impl SessionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<TransportError> for SessionError {
    fn from(e: TransportError) -> Self {
        Self::new(ErrorKind::TransportError, e.to_string())
    }
}

/// Errors from the authentication collaborator
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Rejected by peer: {0}")]
    Rejected(String),

    #[error("Handshake violated: {0}")]
    Protocol(String),

    #[error("Signing failed: {0}")]
    Signing(#[from] HmacError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<AuthError> for SessionError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Transport(e) => e.into(),
            other => Self::new(ErrorKind::AuthRejected, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes_kind() {
        let err = SessionError::new(ErrorKind::TransportError, "connection refused");
        assert_eq!(err.to_string(), "TransportError: connection refused");
    }

    #[test]
    fn test_codes_are_distinct_and_negative() {
        let kinds = [
            ErrorKind::InvalidHandle,
            ErrorKind::InvalidPeerId,
            ErrorKind::DuplicateSession,
            ErrorKind::UnknownSession,
            ErrorKind::RegistryFull,
            ErrorKind::TransportError,
            ErrorKind::AuthRejected,
            ErrorKind::Timeout,
        ];
        let mut codes: Vec<i32> = kinds.iter().map(|k| k.code()).collect();
        assert!(codes.iter().all(|c| *c < 0));
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
    }

    #[test]
    fn test_bad_frame_is_a_transport_error() {
        use remdesk_protocol::ValidationError;
        use remdesk_transport::CodecError;

        let invalid = ValidationError::ChecksumMismatch {
            expected: 1,
            actual: 2,
        };
        let err: SessionError = TransportError::Codec(CodecError::InvalidFrame(invalid)).into();
        assert_eq!(err.kind(), ErrorKind::TransportError);
    }

    #[test]
    fn test_auth_error_mapping() {
        let rejected: SessionError = AuthError::Rejected("bad key".into()).into();
        assert_eq!(rejected.kind(), ErrorKind::AuthRejected);

        let broken: SessionError = AuthError::Transport(TransportError::ConnectionClosed).into();
        assert_eq!(broken.kind(), ErrorKind::TransportError);
        assert_eq!(broken.message(), "Connection closed");
    }
}
