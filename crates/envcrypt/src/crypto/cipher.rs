//! [`EnvelopeCipher`]: AES-256-GCM-SIV encryption of strings and byte buffers.
//!
//! **Algorithm choice:** AES-256-GCM-SIV (RFC 8452) with a fresh random 96-bit
//! nonce per call and a 128-bit tag. SIV mode degrades gracefully if a nonce
//! ever repeats, but nonces are still drawn from the OS CSPRNG on every call
//! and never derived from the plaintext or from a counter.
//!
//! Two output formats:
//! - **String envelope** ([`EnvelopeCipher::encrypt`]): JSON carrying the key
//!   id, so it stays decryptable across rotations until that key is pruned.
//! - **Byte buffer** ([`EnvelopeCipher::encrypt_bytes`]): `nonce || ciphertext || tag`
//!   with no key id. Always sealed and opened with the *current* key, so it is
//!   only fit for data that lives shorter than one rotation interval.

use std::sync::Arc;

use aes_gcm_siv::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes256GcmSiv, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use envcrypt_common::{CryptoError, Envelope};
use tracing::debug;

use crate::keys::{KeyManager, KeyMaterial};

/// Byte length of an AES-GCM-SIV nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Byte length of the authentication tag (16 bytes = 128 bits).
pub const TAG_LEN: usize = 16;

/// Authenticated encryption bound to a [`KeyManager`].
///
/// Never logs plaintext, key material or envelopes; at most key ids.
#[derive(Debug, Clone)]
pub struct EnvelopeCipher {
    keys: Arc<KeyManager>,
}

impl EnvelopeCipher {
    pub fn new(keys: Arc<KeyManager>) -> Self {
        Self { keys }
    }

    /// Seal `plaintext` under the current key into a JSON envelope.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidArgument`] if `plaintext` is empty.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        ensure_non_empty(plaintext.as_bytes())?;
        let (key_id, key) = self.keys.current_key_with_id()?;
        seal_envelope(plaintext.as_bytes(), key_id, &key)
    }

    /// Seal `plaintext` under a specific, still-retained key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidArgument`] if `plaintext` is empty and
    /// [`CryptoError::KeyNotFound`] if `key_id` is not held.
    pub fn encrypt_with_key(&self, plaintext: &str, key_id: &str) -> Result<String, CryptoError> {
        ensure_non_empty(plaintext.as_bytes())?;
        let key = self.keys.key(key_id)?;
        seal_envelope(plaintext.as_bytes(), key_id.to_owned(), &key)
    }

    /// Open a JSON envelope produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// - [`CryptoError::DecryptionFailed`] if the envelope is malformed, was
    ///   tampered with, or does not decode to UTF-8. The cases are not told
    ///   apart.
    /// - [`CryptoError::KeyNotFound`] if the sealing key has been pruned. The
    ///   data is permanently unrecoverable.
    pub fn decrypt(&self, envelope: &str) -> Result<String, CryptoError> {
        let envelope = Envelope::from_json(envelope)?;
        let nonce = decode_exact(&envelope.nonce, NONCE_LEN)?;
        let tag = decode_exact(&envelope.auth_tag, TAG_LEN)?;
        let mut sealed = STANDARD
            .decode(&envelope.cipher_text)
            .map_err(|_| CryptoError::DecryptionFailed)?;
        sealed.extend_from_slice(&tag);

        let key = self.keys.key(&envelope.key_id)?;
        let plaintext = open(&nonce, &sealed, &key).inspect_err(|_| {
            debug!(key_id = %envelope.key_id, "envelope failed authentication");
        })?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
    }

    /// Seal `plaintext` under the current key as `nonce || ciphertext || tag`.
    ///
    /// The buffer does not record which key sealed it.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidArgument`] if `plaintext` is empty.
    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        ensure_non_empty(plaintext)?;
        let key = self.keys.current_key()?;
        let (nonce, sealed) = seal(plaintext, &key)?;
        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    /// Open a buffer produced by [`encrypt_bytes`](Self::encrypt_bytes) with
    /// the current key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::DecryptionFailed`] if the buffer is too short,
    /// was tampered with, or was sealed under a key that is no longer current.
    pub fn decrypt_bytes(&self, buffer: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if buffer.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::DecryptionFailed);
        }
        let key = self.keys.current_key()?;
        let (nonce, sealed) = buffer.split_at(NONCE_LEN);
        open(nonce, sealed, &key)
    }
}

fn ensure_non_empty(plaintext: &[u8]) -> Result<(), CryptoError> {
    if plaintext.is_empty() {
        return Err(CryptoError::InvalidArgument(
            "plaintext must not be empty".into(),
        ));
    }
    Ok(())
}

fn seal_envelope(plaintext: &[u8], key_id: String, key: &KeyMaterial) -> Result<String, CryptoError> {
    let (nonce, sealed) = seal(plaintext, key)?;
    let (cipher_text, auth_tag) = sealed.split_at(sealed.len() - TAG_LEN);
    Envelope {
        key_id,
        nonce: STANDARD.encode(nonce),
        cipher_text: STANDARD.encode(cipher_text),
        auth_tag: STANDARD.encode(auth_tag),
    }
    .to_json()
}

/// Encrypt with a fresh random nonce. Returns the nonce and `ciphertext || tag`.
fn seal(plaintext: &[u8], key: &KeyMaterial) -> Result<([u8; NONCE_LEN], Vec<u8>), CryptoError> {
    let cipher = build_cipher(key)?;
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;
    Ok((nonce, sealed))
}

/// Decrypt `ciphertext || tag`. Every failure is [`CryptoError::DecryptionFailed`].
fn open(nonce: &[u8], sealed: &[u8], key: &KeyMaterial) -> Result<Vec<u8>, CryptoError> {
    let cipher = build_cipher(key)?;
    cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| CryptoError::DecryptionFailed)
}

fn build_cipher(key: &KeyMaterial) -> Result<Aes256GcmSiv, CryptoError> {
    Aes256GcmSiv::new_from_slice(key.as_bytes())
        .map_err(|_| CryptoError::InvalidKeyLength(key.as_bytes().len()))
}

fn decode_exact(field: &str, len: usize) -> Result<Vec<u8>, CryptoError> {
    match STANDARD.decode(field) {
        Ok(bytes) if bytes.len() == len => Ok(bytes),
        _ => Err(CryptoError::DecryptionFailed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use crate::keys::{KeyRotationPolicy, KEY_LEN, MASTER_KEY_ID};

    fn cipher_with(policy: KeyRotationPolicy) -> (EnvelopeCipher, Arc<KeyManager>) {
        let keys = Arc::new(KeyManager::bootstrap(None, policy));
        (EnvelopeCipher::new(Arc::clone(&keys)), keys)
    }

    fn cipher() -> (EnvelopeCipher, Arc<KeyManager>) {
        cipher_with(KeyRotationPolicy::default())
    }

    fn parse(envelope: &str) -> Envelope {
        Envelope::from_json(envelope).unwrap()
    }

    fn flip_bit(field: &str, byte: usize) -> String {
        let mut bytes = STANDARD.decode(field).unwrap();
        bytes[byte] ^= 0x01;
        STANDARD.encode(bytes)
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let (cipher, _) = cipher();
        let long = "long ".repeat(1000);
        for plaintext in ["123-45-6789", "x", "ünïcødé ✓", long.as_str()] {
            let envelope = cipher.encrypt(plaintext).unwrap();
            assert_eq!(cipher.decrypt(&envelope).unwrap(), plaintext);
        }
    }

    #[test]
    fn master_key_scenario() {
        let master = STANDARD
            .decode("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=")
            .unwrap();
        let keys = Arc::new(KeyManager::bootstrap(
            Some(KeyMaterial::from_slice(&master).unwrap()),
            KeyRotationPolicy::default(),
        ));
        assert_eq!(keys.keys().len(), 1);
        let cipher = EnvelopeCipher::new(keys);
        let envelope = cipher.encrypt("hello").unwrap();
        assert_eq!(parse(&envelope).key_id, MASTER_KEY_ID);
        assert_eq!(cipher.decrypt(&envelope).unwrap(), "hello");
    }

    #[test]
    fn envelope_fields_have_expected_sizes() {
        let (cipher, keys) = cipher();
        let envelope = parse(&cipher.encrypt("hello world").unwrap());
        assert_eq!(envelope.key_id, keys.current_key_id());
        assert_eq!(STANDARD.decode(&envelope.nonce).unwrap().len(), NONCE_LEN);
        assert_eq!(STANDARD.decode(&envelope.auth_tag).unwrap().len(), TAG_LEN);
        assert_eq!(
            STANDARD.decode(&envelope.cipher_text).unwrap().len(),
            "hello world".len()
        );
    }

    #[test]
    fn empty_plaintext_rejected() {
        let (cipher, keys) = cipher();
        assert!(matches!(
            cipher.encrypt(""),
            Err(CryptoError::InvalidArgument(_))
        ));
        assert!(matches!(
            cipher.encrypt_with_key("", &keys.current_key_id()),
            Err(CryptoError::InvalidArgument(_))
        ));
        assert!(matches!(
            cipher.encrypt_bytes(b""),
            Err(CryptoError::InvalidArgument(_))
        ));
    }

    #[test]
    fn tampered_cipher_text_fails_auth() {
        let (cipher, _) = cipher();
        let original = parse(&cipher.encrypt("tamper me please").unwrap());
        for byte in 0..16 {
            let mut env = original.clone();
            env.cipher_text = flip_bit(&env.cipher_text, byte);
            assert_eq!(
                cipher.decrypt(&env.to_json().unwrap()),
                Err(CryptoError::DecryptionFailed)
            );
        }
    }

    #[test]
    fn tampered_auth_tag_fails_auth() {
        let (cipher, _) = cipher();
        let original = parse(&cipher.encrypt("tamper me").unwrap());
        for byte in 0..TAG_LEN {
            let mut env = original.clone();
            env.auth_tag = flip_bit(&env.auth_tag, byte);
            assert_eq!(
                cipher.decrypt(&env.to_json().unwrap()),
                Err(CryptoError::DecryptionFailed)
            );
        }
    }

    #[test]
    fn tampered_nonce_fails_auth() {
        let (cipher, _) = cipher();
        let mut env = parse(&cipher.encrypt("tamper me").unwrap());
        env.nonce = flip_bit(&env.nonce, 0);
        assert_eq!(
            cipher.decrypt(&env.to_json().unwrap()),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn swapped_key_id_fails_auth() {
        let (cipher, keys) = cipher();
        let mut env = parse(&cipher.encrypt("secret").unwrap());
        env.key_id = keys.rotate();
        assert_eq!(
            cipher.decrypt(&env.to_json().unwrap()),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn malformed_envelopes_fail_uniformly() {
        let (cipher, _) = cipher();
        let good = parse(&cipher.encrypt("hello").unwrap());

        let mut short_nonce = good.clone();
        short_nonce.nonce = STANDARD.encode([0u8; 8]);
        let mut short_tag = good.clone();
        short_tag.auth_tag = STANDARD.encode([0u8; 15]);
        let mut bad_b64 = good.clone();
        bad_b64.cipher_text = "!!!".into();

        for input in [
            String::new(),
            "not json".to_owned(),
            r#"{"keyId":"k"}"#.to_owned(),
            short_nonce.to_json().unwrap(),
            short_tag.to_json().unwrap(),
            bad_b64.to_json().unwrap(),
        ] {
            assert_eq!(cipher.decrypt(&input), Err(CryptoError::DecryptionFailed));
        }
    }

    #[test]
    fn nonces_and_ciphertexts_never_repeat() {
        let (cipher, _) = cipher();
        let mut nonces = HashSet::new();
        let mut texts = HashSet::new();
        for _ in 0..10_000 {
            let env = parse(&cipher.encrypt("same plaintext").unwrap());
            nonces.insert(env.nonce);
            texts.insert(env.cipher_text);
        }
        assert_eq!(nonces.len(), 10_000);
        assert_eq!(texts.len(), 10_000);
    }

    #[test]
    fn old_envelopes_survive_rotation() {
        let (cipher, keys) = cipher();
        let first = keys.current_key_id();
        let envelope = cipher.encrypt("before rotation").unwrap();
        let pinned = cipher.encrypt_with_key("pinned", &first).unwrap();
        keys.rotate();
        keys.rotate();
        assert_ne!(keys.current_key_id(), first);
        assert_eq!(cipher.decrypt(&envelope).unwrap(), "before rotation");
        assert_eq!(cipher.decrypt(&pinned).unwrap(), "pinned");
    }

    #[test]
    fn encrypt_with_retired_key_records_that_key() {
        let (cipher, keys) = cipher();
        let first = keys.current_key_id();
        keys.rotate();
        let envelope = cipher.encrypt_with_key("re-sealed", &first).unwrap();
        assert_eq!(parse(&envelope).key_id, first);
        assert_eq!(cipher.decrypt(&envelope).unwrap(), "re-sealed");
    }

    #[test]
    fn encrypt_with_unknown_key_fails() {
        let (cipher, _) = cipher();
        assert_eq!(
            cipher.encrypt_with_key("x", "key-missing"),
            Err(CryptoError::KeyNotFound("key-missing".into()))
        );
    }

    #[test]
    fn pruned_key_failure_is_permanent() {
        let (cipher, keys) = cipher();
        let envelope = cipher.encrypt("doomed").unwrap();
        keys.rotate();
        assert_eq!(keys.prune(1), 1);
        let expected = Err(CryptoError::KeyNotFound(parse(&envelope).key_id));
        assert_eq!(cipher.decrypt(&envelope), expected);
        keys.prune(1);
        keys.rotate();
        assert_eq!(cipher.decrypt(&envelope), expected);
    }

    #[test]
    fn encryption_counts_key_usage() {
        let (cipher, keys) = cipher_with(KeyRotationPolicy::new(90, 3, 3, true));
        for _ in 0..3 {
            cipher.encrypt("count me").unwrap();
        }
        assert!(keys.should_rotate());
    }

    #[test]
    fn byte_round_trip() {
        let (cipher, _) = cipher();
        let data = [0u8, 1, 2, 255, 254, 0];
        let sealed = cipher.encrypt_bytes(&data).unwrap();
        assert_eq!(sealed.len(), NONCE_LEN + data.len() + TAG_LEN);
        assert_eq!(cipher.decrypt_bytes(&sealed).unwrap(), data);
    }

    #[test]
    fn byte_buffer_tamper_and_truncation_fail() {
        let (cipher, _) = cipher();
        let mut sealed = cipher.encrypt_bytes(b"payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        assert_eq!(
            cipher.decrypt_bytes(&sealed),
            Err(CryptoError::DecryptionFailed)
        );
        assert_eq!(
            cipher.decrypt_bytes(&[0u8; NONCE_LEN + TAG_LEN - 1]),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn byte_buffer_does_not_survive_rotation() {
        let (cipher, keys) = cipher();
        let sealed = cipher.encrypt_bytes(b"short lived").unwrap();
        keys.rotate();
        assert_eq!(
            cipher.decrypt_bytes(&sealed),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn wrong_key_fails_decryption() {
        let a = KeyMaterial::new([1u8; KEY_LEN]);
        let b = KeyMaterial::new([2u8; KEY_LEN]);
        let (nonce, sealed) = seal(b"secret", &a).unwrap();
        assert!(open(&nonce, &sealed, &a).is_ok());
        assert_eq!(open(&nonce, &sealed, &b), Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn encryption_keeps_working_during_rotation_and_prune() {
        let (cipher, keys) = cipher();
        std::thread::scope(|scope| {
            for _ in 0..2 {
                let keys = Arc::clone(&keys);
                scope.spawn(move || {
                    for _ in 0..100 {
                        keys.rotate();
                        keys.prune(1);
                    }
                });
            }
            for worker in 0..4 {
                let cipher = cipher.clone();
                scope.spawn(move || {
                    let plaintext = format!("worker {worker}");
                    for _ in 0..200 {
                        let sealed = cipher.encrypt(&plaintext).unwrap();
                        match cipher.decrypt(&sealed) {
                            Ok(opened) => assert_eq!(opened, plaintext),
                            Err(CryptoError::KeyNotFound(_)) => {}
                            Err(e) => panic!("unexpected decrypt error: {e:?}"),
                        }
                    }
                });
            }
        });
        assert_eq!(keys.keys().len(), 1);
        assert!(keys.current_key().is_ok());
    }
}
