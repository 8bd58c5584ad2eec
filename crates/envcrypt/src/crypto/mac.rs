//! [`MessageAuthenticator`]: HMAC-SHA256 signatures under the current key.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use envcrypt_common::CryptoError;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::keys::{KeyManager, KeyMaterial};

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies payloads with the key manager's current key.
///
/// Signatures are base64 HMAC-SHA256 tags. They are bound to the key that was
/// current when signing, so they stop verifying once that key is rotated out.
#[derive(Debug, Clone)]
pub struct MessageAuthenticator {
    keys: Arc<KeyManager>,
}

impl MessageAuthenticator {
    pub fn new(keys: Arc<KeyManager>) -> Self {
        Self { keys }
    }

    /// Sign `data`, returning a base64 signature.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidArgument`] if `data` is empty.
    pub fn sign(&self, data: &[u8]) -> Result<String, CryptoError> {
        if data.is_empty() {
            return Err(CryptoError::InvalidArgument("data must not be empty".into()));
        }
        let key = self.keys.current_key()?;
        let tag = build_mac(&key, data)?.finalize().into_bytes();
        Ok(STANDARD.encode(tag))
    }

    /// Check `signature` against `data`.
    ///
    /// The comparison is constant-time. Every failure, including empty input,
    /// bad base64 or a missing key, is reported as plain `false`.
    pub fn verify(&self, data: &[u8], signature: &str) -> bool {
        if data.is_empty() {
            return false;
        }
        let Ok(expected) = STANDARD.decode(signature) else {
            return false;
        };
        let Ok(key) = self.keys.current_key() else {
            return false;
        };
        let Ok(mac) = build_mac(&key, data) else {
            return false;
        };
        mac.verify_slice(&expected).is_ok()
    }
}

fn build_mac(key: &KeyMaterial, data: &[u8]) -> Result<HmacSha256, CryptoError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key.as_bytes())
        .map_err(|_| CryptoError::InvalidKeyLength(key.as_bytes().len()))?;
    mac.update(data);
    Ok(mac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{KeyRotationPolicy, KEY_LEN};

    fn authenticator() -> (MessageAuthenticator, Arc<KeyManager>) {
        let keys = Arc::new(KeyManager::bootstrap(None, KeyRotationPolicy::default()));
        (MessageAuthenticator::new(Arc::clone(&keys)), keys)
    }

    #[test]
    fn sign_then_verify() {
        let (mac, _) = authenticator();
        let sig = mac.sign(b"payload").unwrap();
        assert!(mac.verify(b"payload", &sig));
    }

    #[test]
    fn signature_is_base64_sha256_tag() {
        let (mac, _) = authenticator();
        let sig = mac.sign(b"payload").unwrap();
        assert_eq!(STANDARD.decode(sig).unwrap().len(), 32);
    }

    #[test]
    fn signing_is_deterministic_per_key() {
        let (mac, _) = authenticator();
        assert_eq!(mac.sign(b"same").unwrap(), mac.sign(b"same").unwrap());
    }

    #[test]
    fn signature_of_other_data_rejected() {
        let (mac, _) = authenticator();
        let sig = mac.sign(b"other data").unwrap();
        assert!(!mac.verify(b"payload", &sig));
    }

    #[test]
    fn one_byte_difference_rejected() {
        let (mac, _) = authenticator();
        let mut raw = STANDARD.decode(mac.sign(b"payload").unwrap()).unwrap();
        raw[7] ^= 0x01;
        assert!(!mac.verify(b"payload", &STANDARD.encode(&raw)));
    }

    #[test]
    fn malformed_signatures_are_false() {
        let (mac, _) = authenticator();
        let sig = mac.sign(b"payload").unwrap();
        let raw = STANDARD.decode(&sig).unwrap();
        assert!(!mac.verify(b"payload", ""));
        assert!(!mac.verify(b"payload", "%%% not base64 %%%"));
        assert!(!mac.verify(b"payload", &STANDARD.encode(&raw[..16])));
        assert!(!mac.verify(b"", &sig));
    }

    #[test]
    fn empty_data_cannot_be_signed() {
        let (mac, _) = authenticator();
        assert!(matches!(mac.sign(b""), Err(CryptoError::InvalidArgument(_))));
    }

    #[test]
    fn rotation_invalidates_signatures() {
        let (mac, keys) = authenticator();
        let sig = mac.sign(b"payload").unwrap();
        keys.rotate();
        assert!(!mac.verify(b"payload", &sig));
        assert!(mac.verify(b"payload", &mac.sign(b"payload").unwrap()));
    }

    #[test]
    fn matches_independent_hmac() {
        let key = KeyMaterial::new([0x0b; KEY_LEN]);
        let keys = Arc::new(KeyManager::bootstrap(Some(key), KeyRotationPolicy::default()));
        let mac = MessageAuthenticator::new(keys);
        let mut reference = <HmacSha256 as Mac>::new_from_slice(&[0x0b; KEY_LEN]).unwrap();
        reference.update(b"Hi There");
        let expected = STANDARD.encode(reference.finalize().into_bytes());
        assert_eq!(mac.sign(b"Hi There").unwrap(), expected);
    }
}
