//! [`CryptoService`]: the single handle callers inject.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use envcrypt_common::CryptoError;

use crate::config::Config;
use crate::crypto::{derive_key, DerivedKey, EnvelopeCipher, Hasher, MessageAuthenticator};
use crate::keys::{KeyManager, KeyMaterial};

/// Everything the subsystem exposes, bundled around one shared [`KeyManager`].
///
/// Cheap to clone: all fields are `Arc`-backed or zero-sized, so token
/// services and field-encryption callers can each hold their own copy.
#[derive(Clone, Debug)]
pub struct CryptoService {
    keys: Arc<KeyManager>,
    cipher: EnvelopeCipher,
    authenticator: MessageAuthenticator,
    hasher: Hasher,
    rotation_check_interval: Duration,
}

impl CryptoService {
    /// Wrap an existing key manager.
    pub fn new(keys: Arc<KeyManager>) -> Self {
        Self {
            cipher: EnvelopeCipher::new(Arc::clone(&keys)),
            authenticator: MessageAuthenticator::new(Arc::clone(&keys)),
            hasher: Hasher::new(),
            rotation_check_interval: Duration::from_secs(3600),
            keys,
        }
    }

    /// Bootstrap a key manager from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured master key cannot be decoded.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let master = cfg.master_key_material()?;
        let keys = Arc::new(KeyManager::bootstrap(master, cfg.rotation_policy()));
        let mut service = Self::new(keys);
        service.rotation_check_interval = Duration::from_secs(cfg.key_rotation.check_interval_secs);
        Ok(service)
    }

    /// The shared key manager.
    pub fn keys(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    // -----------------------------------------------------------------------
    // Encryption
    // -----------------------------------------------------------------------

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        self.cipher.encrypt(plaintext)
    }

    pub fn encrypt_with_key(&self, plaintext: &str, key_id: &str) -> Result<String, CryptoError> {
        self.cipher.encrypt_with_key(plaintext, key_id)
    }

    pub fn decrypt(&self, envelope: &str) -> Result<String, CryptoError> {
        self.cipher.decrypt(envelope)
    }

    /// See [`EnvelopeCipher::encrypt_bytes`]: the output carries no key id.
    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.cipher.encrypt_bytes(plaintext)
    }

    pub fn decrypt_bytes(&self, buffer: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.cipher.decrypt_bytes(buffer)
    }

    // -----------------------------------------------------------------------
    // Signing and hashing
    // -----------------------------------------------------------------------

    pub fn sign(&self, data: &[u8]) -> Result<String, CryptoError> {
        self.authenticator.sign(data)
    }

    pub fn verify(&self, data: &[u8], signature: &str) -> bool {
        self.authenticator.verify(data, signature)
    }

    pub fn hash(&self, data: &[u8]) -> String {
        self.hasher.hash(data)
    }

    pub fn verify_hash(&self, data: &[u8], digest: &str) -> bool {
        self.hasher.verify_hash(data, digest)
    }

    pub fn derive_key(
        &self,
        password: &[u8],
        salt: Option<&[u8]>,
        iterations: u32,
    ) -> Result<DerivedKey, CryptoError> {
        derive_key(password, salt, iterations)
    }

    // -----------------------------------------------------------------------
    // Key lifecycle
    // -----------------------------------------------------------------------

    pub fn current_key(&self) -> Result<KeyMaterial, CryptoError> {
        self.keys.current_key()
    }

    pub fn key(&self, key_id: &str) -> Result<KeyMaterial, CryptoError> {
        self.keys.key(key_id)
    }

    pub fn rotate_key(&self) -> String {
        self.keys.rotate()
    }

    pub fn prune_old_keys(&self) -> usize {
        self.keys.prune_old_keys()
    }

    pub fn should_rotate_key(&self) -> bool {
        self.keys.should_rotate()
    }

    /// Start the background rotation loop at the configured check interval.
    ///
    /// Must be called from within a tokio runtime.
    #[cfg(feature = "scheduler")]
    pub fn spawn_rotation_task(&self) -> tokio::task::JoinHandle<()> {
        crate::keys::rotation_task(Arc::clone(&self.keys), self.rotation_check_interval)
    }
}
