//! [`KeyStore`]: registry of key records, plus the in-memory reference store.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use envcrypt_common::CryptoError;
use parking_lot::RwLock;

use super::material::KeyMaterial;

/// One managed key and its usage metadata.
///
/// The id and material never change after creation. Only `last_used_at`
/// and `operation_count` move, and only through [`KeyStore::record_use`].
#[derive(Debug, Clone)]
pub struct KeyRecord {
    key_id: String,
    material: KeyMaterial,
    created_at: DateTime<Utc>,
    last_used_at: Option<DateTime<Utc>>,
    operation_count: u64,
}

impl KeyRecord {
    /// Create a never-used record stamped with the current time.
    pub fn new(key_id: impl Into<String>, material: KeyMaterial) -> Self {
        Self {
            key_id: key_id.into(),
            material,
            created_at: Utc::now(),
            last_used_at: None,
            operation_count: 0,
        }
    }

    /// Override the creation time. Used when loading records from a durable
    /// backend.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Restore usage metadata. Used when loading records from a durable
    /// backend.
    pub fn with_usage(mut self, operation_count: u64, last_used_at: Option<DateTime<Utc>>) -> Self {
        self.operation_count = operation_count;
        self.last_used_at = last_used_at;
        self
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn material(&self) -> &KeyMaterial {
        &self.material
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_used_at(&self) -> Option<DateTime<Utc>> {
        self.last_used_at
    }

    pub fn operation_count(&self) -> u64 {
        self.operation_count
    }

    /// Bump usage metadata for one operation at `now`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.operation_count = self.operation_count.saturating_add(1);
        self.last_used_at = Some(now);
    }
}

/// Order records newest first: `created_at` descending, ties broken by key
/// id descending (generated ids are time-ordered).
pub fn sort_newest_first(records: &mut [KeyRecord]) {
    records.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.key_id.cmp(&a.key_id))
    });
}

/// Thread-safe mapping `key_id -> KeyRecord`.
///
/// Only the key manager inserts and removes records; ciphers and
/// authenticators go through [`record_use`](KeyStore::record_use).
///
/// # Contract for durable backends
///
/// A database- or HSM-backed implementation must:
/// - persist every inserted record before `insert` returns, so a restart never
///   orphans data sealed under a generated key;
/// - make `record_use` atomic per key (counter increments must not be lost);
/// - return records from `all` newest first (see [`sort_newest_first`]);
/// - never log key material.
///
/// All methods are synchronous and assumed fast. A backend that reaches a
/// remote KMS should fetch and cache material ahead of time rather than hide
/// network calls behind these methods.
#[cfg_attr(test, mockall::automock)]
pub trait KeyStore: Send + Sync {
    /// Add or replace a record. Last write wins.
    fn insert(&self, record: KeyRecord);

    /// Snapshot of one record, metadata untouched.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyNotFound`] if `key_id` is absent.
    fn get(&self, key_id: &str) -> Result<KeyRecord, CryptoError>;

    /// Remove a record, returning whether it existed.
    fn remove(&self, key_id: &str) -> bool;

    /// Snapshot of every record, newest first.
    fn all(&self) -> Vec<KeyRecord>;

    /// Record one use of `key_id` and return a copy of its material.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyNotFound`] if `key_id` is absent.
    fn record_use(&self, key_id: &str) -> Result<KeyMaterial, CryptoError>;
}

/// Process-memory [`KeyStore`].
///
/// Records do not survive a restart. Anything sealed under a generated key is
/// lost with the process unless the material is persisted out of band.
#[derive(Clone, Debug, Default)]
pub struct InMemoryKeyStore {
    inner: Arc<RwLock<HashMap<String, KeyRecord>>>,
}

impl InMemoryKeyStore {
    /// Create a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns `true` if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl KeyStore for InMemoryKeyStore {
    fn insert(&self, record: KeyRecord) {
        self.inner.write().insert(record.key_id.clone(), record);
    }

    fn get(&self, key_id: &str) -> Result<KeyRecord, CryptoError> {
        self.inner
            .read()
            .get(key_id)
            .cloned()
            .ok_or_else(|| CryptoError::KeyNotFound(key_id.to_owned()))
    }

    fn remove(&self, key_id: &str) -> bool {
        self.inner.write().remove(key_id).is_some()
    }

    fn all(&self) -> Vec<KeyRecord> {
        let mut records: Vec<KeyRecord> = self.inner.read().values().cloned().collect();
        sort_newest_first(&mut records);
        records
    }

    fn record_use(&self, key_id: &str) -> Result<KeyMaterial, CryptoError> {
        let mut map = self.inner.write();
        let record = map
            .get_mut(key_id)
            .ok_or_else(|| CryptoError::KeyNotFound(key_id.to_owned()))?;
        record.touch(Utc::now());
        Ok(record.material.clone())
    }
}
