//! Wire types produced by envcrypt and persisted by callers as opaque strings.
//!
//! The envelope layout is stable and must stay backward compatible: every
//! ciphertext ever written has to remain parseable.

use serde::{Deserialize, Serialize};

use crate::error::CryptoError;

// ---------------------------------------------------------------------------
// String envelope
// ---------------------------------------------------------------------------

/// Serialized output of one string encryption.
///
/// All binary fields are standard base64 (with padding). The JSON form is:
///
/// ```text
/// {"keyId":"<id>","nonce":"<b64 12B>","cipherText":"<b64>","authTag":"<b64 16B>"}
/// ```
///
/// Field lengths are not checked here; the cipher validates decoded sizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Id of the key that sealed this envelope.
    pub key_id: String,
    /// Base64 of the 96-bit nonce.
    pub nonce: String,
    /// Base64 of the ciphertext (same length as the plaintext).
    pub cipher_text: String,
    /// Base64 of the 128-bit authentication tag.
    pub auth_tag: String,
}

impl Envelope {
    /// Encode this envelope to its canonical JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EncryptionFailed`] if serialization fails.
    pub fn to_json(&self) -> Result<String, CryptoError> {
        serde_json::to_string(self).map_err(|_| CryptoError::EncryptionFailed)
    }

    /// Parse an envelope from its JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::DecryptionFailed`] for any malformed input, so
    /// that parse failures look the same as authentication failures.
    pub fn from_json(s: &str) -> Result<Self, CryptoError> {
        serde_json::from_str(s).map_err(|_| CryptoError::DecryptionFailed)
    }
}
