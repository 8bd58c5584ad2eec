//! Error taxonomy shared across crates.

use thiserror::Error;

/// Errors surfaced by every envcrypt operation.
///
/// Each variant carries a stable machine-readable [`code`](CryptoError::code)
/// so that callers one layer up can map failures to user-facing messages:
/// - [`CryptoError::InvalidArgument`] → `"invalid_argument"`
/// - [`CryptoError::KeyNotFound`] → `"key_not_found"`
/// - [`CryptoError::DecryptionFailed`] → `"decryption_failed"`
/// - [`CryptoError::RotationInProgress`] → `"rotation_in_progress"`
/// - [`CryptoError::InvalidKeyLength`] → `"invalid_key_length"`
/// - [`CryptoError::EncryptionFailed`] → `"encryption_failed"`
///
/// None of these are transient. Retrying a failed decryption cannot succeed:
/// the data is either corrupt or its key is gone.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// A required input was empty or otherwise unusable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The key id is unknown to the key store, either never issued or pruned.
    ///
    /// Data sealed under a pruned key is permanently unrecoverable.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// The envelope was malformed or failed authentication.
    ///
    /// Deliberately carries no detail: format errors and tag mismatches must
    /// be indistinguishable to the caller.
    #[error("decryption failed")]
    DecryptionFailed,

    /// Another rotation currently holds the rotation lock.
    #[error("key rotation already in progress")]
    RotationInProgress,

    /// Key material had the wrong length (must be 32 bytes).
    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// The AEAD primitive refused to encrypt.
    #[error("encryption failed")]
    EncryptionFailed,
}

impl CryptoError {
    /// Short machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            CryptoError::InvalidArgument(_) => "invalid_argument",
            CryptoError::KeyNotFound(_) => "key_not_found",
            CryptoError::DecryptionFailed => "decryption_failed",
            CryptoError::RotationInProgress => "rotation_in_progress",
            CryptoError::InvalidKeyLength(_) => "invalid_key_length",
            CryptoError::EncryptionFailed => "encryption_failed",
        }
    }

    /// Returns `true` if the failure means the protected data can never be
    /// recovered (its key was pruned or the envelope is damaged).
    pub fn is_data_loss(&self) -> bool {
        matches!(
            self,
            CryptoError::KeyNotFound(_) | CryptoError::DecryptionFailed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        assert_eq!(
            CryptoError::InvalidArgument("x".into()).code(),
            "invalid_argument"
        );
        assert_eq!(CryptoError::KeyNotFound("k".into()).code(), "key_not_found");
        assert_eq!(CryptoError::DecryptionFailed.code(), "decryption_failed");
        assert_eq!(
            CryptoError::RotationInProgress.code(),
            "rotation_in_progress"
        );
        assert_eq!(CryptoError::InvalidKeyLength(16).code(), "invalid_key_length");
        assert_eq!(CryptoError::EncryptionFailed.code(), "encryption_failed");
    }

    #[test]
    fn decryption_failure_carries_no_detail() {
        assert_eq!(CryptoError::DecryptionFailed.to_string(), "decryption failed");
    }

    #[test]
    fn display_includes_key_id() {
        let e = CryptoError::KeyNotFound("key-0190".into());
        assert!(e.to_string().contains("key-0190"));
    }

    #[test]
    fn data_loss_classification() {
        assert!(CryptoError::KeyNotFound("k".into()).is_data_loss());
        assert!(CryptoError::DecryptionFailed.is_data_loss());
        assert!(!CryptoError::RotationInProgress.is_data_loss());
        assert!(!CryptoError::InvalidArgument("x".into()).is_data_loss());
    }
}
