//! Whole-file XOR obfuscation.
//!
//! This is **not** encryption: the keystream is a deterministic, static
//! function of the password and is reused identically for every block's
//! data payload. It hides the presence of SBX blocks from a casual scan,
//! nothing more. Do not present this to a user as confidentiality.

use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password must not be empty")]
    Empty,
}

/// Derives a keystream of exactly `len` bytes by concatenating
/// `SHA256(password)`, `SHA256(password || k0)`, `SHA256(password || k0 || k1)`, ...
/// until enough bytes are available, then truncating.
pub struct Keystream {
    bytes: Vec<u8>,
}

impl Keystream {
    pub fn derive(password: &str, len: usize) -> Result<Self, PasswordError> {
        if password.is_empty() {
            return Err(PasswordError::Empty);
        }
        let mut bytes = Vec::with_capacity(len + 32);
        let mut running = password.as_bytes().to_vec();
        while bytes.len() < len {
            let digest = Sha256::digest(&running);
            bytes.extend_from_slice(&digest);
            running.extend_from_slice(&digest);
        }
        bytes.truncate(len);
        Ok(Keystream { bytes })
    }

    /// XOR `data` in place against this keystream. `data.len()` must not
    /// exceed the keystream length.
    pub fn apply(&self, data: &mut [u8]) {
        for (b, k) in data.iter_mut().zip(self.bytes.iter()) {
            *b ^= k;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_is_its_own_inverse() {
        let ks = Keystream::derive("hunter2", 278).unwrap();
        let original = vec![0x42u8; 278];
        let mut data = original.clone();
        ks.apply(&mut data);
        assert_ne!(data, original);
        ks.apply(&mut data);
        assert_eq!(data, original);
    }

    #[test]
    fn rejects_empty_password() {
        assert!(Keystream::derive("", 16).is_err());
    }

    #[test]
    fn keystream_length_matches_request() {
        let ks = Keystream::derive("x", 2352).unwrap();
        assert_eq!(ks.bytes.len(), 2352);
    }
}
