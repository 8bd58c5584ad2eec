//! Key storage, rotation policy and lifecycle orchestration.
//!
//! # Lifecycle
//!
//! 1. At startup, [`KeyManager::bootstrap`] seeds the store from the configured
//!    master key, or generates an ephemeral key and warns about it.
//! 2. Key material lives only in process memory (or in whatever backend
//!    implements [`KeyStore`]).
//! 3. Something outside the hot path asks [`KeyManager::should_rotate`] and
//!    rotates/prunes accordingly. [`rotation_task`] is a ready-made tokio loop
//!    for that.
//! 4. Ciphers borrow key copies through [`KeyManager::current_key`] and
//!    [`KeyManager::key`]; every borrow is counted.
//!
//! # Security invariants
//!
//! - Key material is never written to disk, logged, or included in traces.
//! - The current key is never pruned.

pub mod manager;
pub mod material;
pub mod policy;
pub mod store;

pub use manager::{KeyInfo, KeyManager, MASTER_KEY_ID};
pub use material::{KeyMaterial, KEY_LEN};
pub use policy::KeyRotationPolicy;
pub use store::{InMemoryKeyStore, KeyRecord, KeyStore};

#[cfg(feature = "scheduler")]
pub use scheduler::{rotation_task, MIN_CHECK_INTERVAL};

#[cfg(feature = "scheduler")]
mod scheduler {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time;
    use tracing::{debug, info, warn};

    use super::KeyManager;

    /// Shortest period between rotation checks.
    pub const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(1);

    /// Spawn a background task that runs [`KeyManager::rotate_if_needed`] on
    /// every tick of `interval`.
    ///
    /// The first check fires after one full interval. Rotation runs on the
    /// blocking pool since it takes the manager's rotation lock.
    ///
    /// Must be called from within a tokio runtime. A zero `interval` is
    /// raised to [`MIN_CHECK_INTERVAL`].
    pub fn rotation_task(manager: Arc<KeyManager>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let interval = interval.max(MIN_CHECK_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            // First tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let manager = Arc::clone(&manager);
                match tokio::task::spawn_blocking(move || manager.rotate_if_needed()).await {
                    Ok(Some(key_id)) => info!(key_id = %key_id, "scheduled key rotation completed"),
                    Ok(None) => debug!("key rotation not due"),
                    Err(e) => warn!(error = %e, "key rotation check failed; retaining current key"),
                }
            }
        })
    }

}
