//! `envcrypt`: multi-key envelope encryption and key lifecycle management.
//!
//! Typical wiring at application startup:
//! 1. Load and validate [`Config`] (environment variables by default).
//! 2. Optionally install a subscriber with [`telemetry::init`].
//! 3. Build a [`CryptoService`], which bootstraps the [`KeyManager`] from the
//!    configured master key or generates an ephemeral key.
//! 4. Inject clones of the service into token and field-encryption callers.
//! 5. Optionally spawn the background rotation check.
//!
//! ```no_run
//! # fn main() -> anyhow::Result<()> {
//! let cfg = envcrypt::Config::from_env()?;
//! let svc = envcrypt::CryptoService::from_config(&cfg)?;
//! let sealed = svc.encrypt("oauth-refresh-token")?;
//! assert_eq!(svc.decrypt(&sealed)?, "oauth-refresh-token");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crypto;
pub mod keys;
pub mod service;
pub mod telemetry;

pub use config::Config;
pub use crypto::{DerivedKey, EnvelopeCipher, Hasher, MessageAuthenticator};
pub use envcrypt_common::{CryptoError, Envelope};
pub use keys::{InMemoryKeyStore, KeyInfo, KeyManager, KeyRecord, KeyRotationPolicy, KeyStore};
pub use service::CryptoService;
