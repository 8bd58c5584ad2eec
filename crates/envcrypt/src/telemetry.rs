//! Tracing subscriber setup for host binaries.
//!
//! The library itself only emits `tracing` events and never installs a
//! subscriber. Hosts without their own pipeline can call [`init`].
//!
//! # Telemetry invariants
//!
//! - **No plaintext or key material** appears in any event field. Key ids,
//!   counts and error codes are the most that is ever logged.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Install a global JSON subscriber at `log_level`.
///
/// `RUST_LOG`, when set, takes precedence over `log_level`.
///
/// # Errors
///
/// Returns an error if a global subscriber has already been set.
pub fn init(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise envcrypt tracing subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_fails() {
        // Only the second outcome is deterministic.
        let _ = init("debug");
        assert!(init("info").is_err());
    }
}
