//! [`KeyManager`]: current-key selection, rotation and pruning.
//!
//! # Key lifecycle
//!
//! ```text
//! Active ──(newer key becomes current)──▶ Retired ──(prune)──▶ Pruned
//! ```
//!
//! Retired keys still decrypt. Pruned keys are gone for good: anything sealed
//! under them can no longer be opened.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use envcrypt_common::CryptoError;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::material::KeyMaterial;
use super::policy::KeyRotationPolicy;
use super::store::{sort_newest_first, InMemoryKeyStore, KeyRecord, KeyStore};

/// Id given to a configured master key at bootstrap.
pub const MASTER_KEY_ID: &str = "master-001";

/// Key metadata without material, for listing and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyInfo {
    pub key_id: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub operation_count: u64,
    pub is_current: bool,
}

/// Single source of truth for which key is current.
///
/// Encryption traffic reads the current id lock-free through an [`ArcSwap`];
/// rotation and pruning serialize on an internal mutex so two concurrent
/// rotations can never leave the current id pointing at a pruned key.
pub struct KeyManager {
    store: Arc<dyn KeyStore>,
    policy: KeyRotationPolicy,
    current: ArcSwap<String>,
    rotation_lock: Mutex<()>,
}

impl KeyManager {
    /// Bootstrap over a fresh [`InMemoryKeyStore`].
    ///
    /// With a master key, it becomes the sole record under [`MASTER_KEY_ID`].
    /// Without one, a key is generated and a warning is emitted: it lives only
    /// in this process.
    pub fn bootstrap(master_key: Option<KeyMaterial>, policy: KeyRotationPolicy) -> Self {
        Self::bootstrap_with_store(Arc::new(InMemoryKeyStore::new()), master_key, policy)
    }

    /// Bootstrap over an arbitrary store.
    ///
    /// If `store` already holds records (a durable backend after a restart),
    /// its newest record becomes current. A configured master key missing from
    /// such a store is added as its oldest retired key so that data sealed
    /// under it stays readable.
    pub fn bootstrap_with_store(
        store: Arc<dyn KeyStore>,
        master_key: Option<KeyMaterial>,
        policy: KeyRotationPolicy,
    ) -> Self {
        let existing = store.all();

        let current_id = match (existing.first(), master_key) {
            (Some(newest), master) => {
                if let Some(material) = master {
                    if store.get(MASTER_KEY_ID).is_err() {
                        // Strictly older than every stored key, so the
                        // master key is the first one pruned.
                        let oldest = existing
                            .iter()
                            .map(KeyRecord::created_at)
                            .min()
                            .unwrap_or_else(Utc::now)
                            - chrono::Duration::milliseconds(1);
                        store.insert(
                            KeyRecord::new(MASTER_KEY_ID, material).with_created_at(oldest),
                        );
                    }
                }
                info!(
                    key_id = %newest.key_id(),
                    keys = existing.len(),
                    "adopted newest key from existing key store"
                );
                newest.key_id().to_owned()
            }
            (None, Some(material)) => {
                store.insert(KeyRecord::new(MASTER_KEY_ID, material));
                info!(key_id = MASTER_KEY_ID, "master key loaded");
                MASTER_KEY_ID.to_owned()
            }
            (None, None) => {
                let key_id = fresh_key_id(store.as_ref());
                store.insert(KeyRecord::new(key_id.clone(), KeyMaterial::generate()));
                warn!(
                    key_id = %key_id,
                    "no master key configured: generated an ephemeral encryption key; \
                     data encrypted under it is lost on restart unless the key is persisted out of band"
                );
                key_id
            }
        };

        Self {
            store,
            policy,
            current: ArcSwap::from_pointee(current_id),
            rotation_lock: Mutex::new(()),
        }
    }

    /// The rotation policy this manager evaluates.
    pub fn policy(&self) -> &KeyRotationPolicy {
        &self.policy
    }

    /// Id of the active key.
    pub fn current_key_id(&self) -> String {
        (**self.current.load()).clone()
    }

    /// Material of the active key. Counts as one use.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyNotFound`] only if the store lost the current
    /// record behind the manager's back.
    pub fn current_key(&self) -> Result<KeyMaterial, CryptoError> {
        self.current_key_with_id().map(|(_, key)| key)
    }

    /// Id and material of the active key, resolved together. Counts as one use.
    ///
    /// # Errors
    ///
    /// See [`current_key`](Self::current_key).
    pub fn current_key_with_id(&self) -> Result<(String, KeyMaterial), CryptoError> {
        loop {
            let key_id = self.current.load_full();
            match self.store.record_use(&key_id) {
                Ok(key) => return Ok(((*key_id).clone(), key)),
                // A rotation plus prune raced us; retry against the new id.
                Err(CryptoError::KeyNotFound(_)) if *self.current.load_full() != *key_id => {
                    continue
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Material of a specific key, current or retired. Counts as one use.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyNotFound`] if `key_id` was never issued or has
    /// been pruned. This is permanent.
    pub fn key(&self, key_id: &str) -> Result<KeyMaterial, CryptoError> {
        self.store.record_use(key_id)
    }

    /// Generate a new key and make it current, waiting for any in-flight
    /// rotation or prune to finish first.
    pub fn rotate(&self) -> String {
        let _guard = self.rotation_lock.lock();
        self.rotate_locked()
    }

    /// Like [`rotate`](Self::rotate) but refuses instead of waiting.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::RotationInProgress`] if another rotation or
    /// prune holds the lock.
    pub fn try_rotate(&self) -> Result<String, CryptoError> {
        let _guard = self
            .rotation_lock
            .try_lock()
            .ok_or(CryptoError::RotationInProgress)?;
        Ok(self.rotate_locked())
    }

    /// Keep the newest `keep_count` keys and delete the rest, never deleting
    /// the current key. Returns how many keys were removed.
    pub fn prune(&self, keep_count: usize) -> usize {
        let _guard = self.rotation_lock.lock();
        self.prune_locked(keep_count)
    }

    /// Prune down to the current key plus the policy's retained old keys.
    pub fn prune_old_keys(&self) -> usize {
        let _guard = self.rotation_lock.lock();
        self.prune_locked(self.retention())
    }

    /// Whether the current key has outlived the policy's age or operation
    /// limit. Pure: records no use and changes nothing.
    pub fn should_rotate(&self) -> bool {
        if !self.policy.auto_rotation_enabled() {
            return false;
        }
        let key_id = self.current.load_full();
        match self.store.get(&key_id) {
            Ok(record) => {
                self.policy
                    .is_due(record.created_at(), record.operation_count(), Utc::now())
            }
            Err(_) => {
                warn!(key_id = %key_id, "current key missing from key store");
                true
            }
        }
    }

    /// One maintenance step: if rotation is due, rotate and prune to the
    /// retention count. Returns the new key id when a rotation happened.
    pub fn rotate_if_needed(&self) -> Option<String> {
        let _guard = self.rotation_lock.lock();
        if !self.should_rotate() {
            return None;
        }
        let key_id = self.rotate_locked();
        self.prune_locked(self.retention());
        Some(key_id)
    }

    /// Metadata for every held key, newest first.
    pub fn keys(&self) -> Vec<KeyInfo> {
        let current = self.current.load_full();
        let mut records = self.store.all();
        sort_newest_first(&mut records);
        records
            .iter()
            .map(|r| KeyInfo {
                key_id: r.key_id().to_owned(),
                created_at: r.created_at(),
                last_used_at: r.last_used_at(),
                operation_count: r.operation_count(),
                is_current: r.key_id() == current.as_str(),
            })
            .collect()
    }

    fn retention(&self) -> usize {
        self.policy.keep_old_keys_count().saturating_add(1)
    }

    fn rotate_locked(&self) -> String {
        let key_id = fresh_key_id(self.store.as_ref());
        self.store
            .insert(KeyRecord::new(key_id.clone(), KeyMaterial::generate()));
        let previous = self.current.swap(Arc::new(key_id.clone()));
        info!(key_id = %key_id, previous_key_id = %previous, "encryption key rotated");
        key_id
    }

    fn prune_locked(&self, keep_count: usize) -> usize {
        let current = self.current.load_full();
        let mut records = self.store.all();
        sort_newest_first(&mut records);

        let mut removed = 0;
        for record in records.iter().skip(keep_count) {
            if record.key_id() == current.as_str() {
                continue;
            }
            if self.store.remove(record.key_id()) {
                debug!(key_id = %record.key_id(), "pruned retired key");
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, keep_count, "pruned retired keys");
        }
        removed
    }
}

impl fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyManager")
            .field("current_key_id", &self.current.load().as_str())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Time-ordered id that is not yet present in `store`.
fn fresh_key_id(store: &dyn KeyStore) -> String {
    loop {
        let key_id = format!("key-{}", Uuid::now_v7().simple());
        if store.get(&key_id).is_err() {
            return key_id;
        }
    }
}
