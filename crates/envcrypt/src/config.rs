//! Configuration loading and validation.
//!
//! Values are read from environment variables prefixed with `ENVCRYPT_`;
//! nested keys use `__` (e.g. `ENVCRYPT_KEY_ROTATION__INTERVAL_DAYS`). Hosts
//! with their own configuration layers can hand a pre-built
//! [`config::Config`] to [`Config::from_source`].

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;

use crate::keys::{KeyMaterial, KeyRotationPolicy, KEY_LEN};

/// Validated envcrypt configuration.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// Base64 master key (32 bytes once decoded). Without it, bootstrap
    /// generates an ephemeral key.
    #[serde(default)]
    pub master_key: Option<String>,

    /// Rotation thresholds and retention.
    #[serde(default)]
    pub key_rotation: KeyRotationConfig,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// The `key_rotation.*` table.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyRotationConfig {
    /// Maximum age of the current key, in days.
    #[serde(default = "default_interval_days")]
    pub interval_days: u32,

    /// Maximum operations on the current key before rotation is due.
    #[serde(default = "default_max_operations")]
    pub max_operations: u64,

    /// Retired keys kept when pruning.
    #[serde(default = "default_keep_old_keys")]
    pub keep_old_keys: usize,

    /// Master switch for rotation decisions.
    #[serde(default = "default_auto_rotation")]
    pub auto_rotation: bool,

    /// How often (seconds) the background task checks whether to rotate.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
}

impl Default for KeyRotationConfig {
    fn default() -> Self {
        Self {
            interval_days: default_interval_days(),
            max_operations: default_max_operations(),
            keep_old_keys: default_keep_old_keys(),
            auto_rotation: default_auto_rotation(),
            check_interval_secs: default_check_interval(),
        }
    }
}

fn default_interval_days() -> u32 {
    90
}
fn default_max_operations() -> u64 {
    1_000_000
}
fn default_keep_old_keys() -> usize {
    3
}
fn default_auto_rotation() -> bool {
    true
}
fn default_check_interval() -> u64 {
    3600
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            master_key: None,
            key_rotation: KeyRotationConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("master_key", &self.master_key.as_ref().map(|_| "[REDACTED]"))
            .field("key_rotation", &self.key_rotation)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Config {
    /// Load and validate configuration from `ENVCRYPT_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or fails validation.
    pub fn from_env() -> Result<Self> {
        let source = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("ENVCRYPT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("failed to build configuration from environment")?;
        Self::from_source(source)
    }

    /// Deserialize and validate an already-built configuration source.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization or validation fails.
    pub fn from_source(source: config::Config) -> Result<Self> {
        let c: Config = source
            .try_deserialize()
            .context("failed to deserialise configuration")?;
        c.validate()?;
        Ok(c)
    }

    /// Decoded master key, if one is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not base64 or not exactly 32 bytes.
    pub fn master_key_material(&self) -> Result<Option<KeyMaterial>> {
        let Some(encoded) = self.master_key.as_deref().map(str::trim) else {
            return Ok(None);
        };
        if encoded.is_empty() {
            return Ok(None);
        }
        let bytes = STANDARD
            .decode(encoded)
            .context("MASTER_KEY must be valid base64")?;
        let key = KeyMaterial::from_slice(&bytes)
            .with_context(|| format!("MASTER_KEY must decode to exactly {KEY_LEN} bytes"))?;
        Ok(Some(key))
    }

    /// Rotation policy described by the `key_rotation` table.
    pub fn rotation_policy(&self) -> KeyRotationPolicy {
        KeyRotationPolicy::new(
            self.key_rotation.interval_days,
            self.key_rotation.max_operations,
            self.key_rotation.keep_old_keys,
            self.key_rotation.auto_rotation,
        )
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        if self.key_rotation.interval_days == 0 {
            anyhow::bail!("KEY_ROTATION__INTERVAL_DAYS must be > 0");
        }
        if self.key_rotation.max_operations == 0 {
            anyhow::bail!("KEY_ROTATION__MAX_OPERATIONS must be > 0");
        }
        if self.key_rotation.check_interval_secs == 0 {
            anyhow::bail!("KEY_ROTATION__CHECK_INTERVAL_SECS must be > 0");
        }
        self.master_key_material()?;
        Ok(())
    }
}
