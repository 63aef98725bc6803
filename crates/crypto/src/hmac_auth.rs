//! HMAC-SHA256 request signing

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HmacError {
    #[error("Invalid key length")]
    InvalidKeyLength,

    #[error("HMAC verification failed")]
    VerificationFailed,
}

/// Signs a sequence of fields with a pre-shared key
///
/// Every field is length-prefixed before it is fed to the MAC, so
/// `["ab", "c"]` and `["a", "bc"]` produce different tags.
#[derive(Clone)]
pub struct RequestSigner {
    key: Vec<u8>,
}

impl RequestSigner {
    /// Create a signer with the given pre-shared key
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    /// Compute the tag over the given fields
    pub fn sign(&self, fields: &[&[u8]]) -> Result<[u8; 32], HmacError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).map_err(|_| HmacError::InvalidKeyLength)?;
        for field in fields {
            mac.update(&(field.len() as u32).to_le_bytes());
            mac.update(field);
        }
        Ok(mac.finalize().into_bytes().into())
    }

    /// Verify a tag in constant time
    pub fn verify(&self, fields: &[&[u8]], expected: &[u8; 32]) -> Result<(), HmacError> {
        let computed = self.sign(fields)?;
        if constant_time_compare(&computed, expected) {
            Ok(())
        } else {
            Err(HmacError::VerificationFailed)
        }
    }
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Constant-time comparison to prevent timing attacks
#[inline]
fn constant_time_compare(a: &[u8; 32], b: &[u8; 32]) -> bool {
    let mut result = 0u8;
    for i in 0..32 {
        result |= a[i] ^ b[i];
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let signer = RequestSigner::new(vec![42u8; 32]);

        let tag = signer.sign(&[b"client", b"peer-42"]).unwrap();
        assert!(signer.verify(&[b"client", b"peer-42"], &tag).is_ok());
    }

    #[test]
    fn test_wrong_fields() {
        let signer = RequestSigner::new(vec![42u8; 32]);

        let tag = signer.sign(&[b"client", b"peer-42"]).unwrap();
        assert_eq!(
            signer.verify(&[b"client", b"peer-43"], &tag),
            Err(HmacError::VerificationFailed)
        );
    }

    #[test]
    fn test_field_boundaries_matter() {
        let signer = RequestSigner::new(b"secret".to_vec());

        let a = signer.sign(&[b"ab", b"c"]).unwrap();
        let b = signer.sign(&[b"a", b"bc"]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_different_keys() {
        let a = RequestSigner::new(vec![1u8; 32]);
        let b = RequestSigner::new(vec![2u8; 32]);

        let tag = a.sign(&[b"data"]).unwrap();
        assert!(b.verify(&[b"data"], &tag).is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let signer = RequestSigner::new(b"hunter2".to_vec());
        assert!(!format!("{signer:?}").contains("hunter2"));
    }
}
