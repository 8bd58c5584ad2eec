//! [`Hasher`]: unkeyed SHA-256 digests with constant-time verification.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Byte length of a SHA-256 digest.
pub const DIGEST_LEN: usize = 32;

/// One-way hashing. Holds no key and needs no key manager.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hasher;

impl Hasher {
    pub fn new() -> Self {
        Self
    }

    /// Base64 SHA-256 digest of `data`.
    pub fn hash(&self, data: &[u8]) -> String {
        STANDARD.encode(Sha256::digest(data))
    }

    /// Recompute the digest of `data` and compare it with `digest` in
    /// constant time. A malformed `digest` is simply `false`.
    pub fn verify_hash(&self, data: &[u8], digest: &str) -> bool {
        let Ok(expected) = STANDARD.decode(digest) else {
            return false;
        };
        if expected.len() != DIGEST_LEN {
            return false;
        }
        let actual = Sha256::digest(data);
        actual.as_slice().ct_eq(&expected).into()
    }
}
