//! [`KeyRotationPolicy`]: when to rotate and how many retired keys to keep.

use chrono::{DateTime, Duration, Utc};

/// Rotation thresholds and retention, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRotationPolicy {
    rotation_interval_days: u32,
    max_operations_before_rotation: u64,
    keep_old_keys_count: usize,
    auto_rotation_enabled: bool,
}

impl Default for KeyRotationPolicy {
    fn default() -> Self {
        Self {
            rotation_interval_days: 90,
            max_operations_before_rotation: 1_000_000,
            keep_old_keys_count: 3,
            auto_rotation_enabled: true,
        }
    }
}

impl KeyRotationPolicy {
    pub fn new(
        rotation_interval_days: u32,
        max_operations_before_rotation: u64,
        keep_old_keys_count: usize,
        auto_rotation_enabled: bool,
    ) -> Self {
        Self {
            rotation_interval_days,
            max_operations_before_rotation,
            keep_old_keys_count,
            auto_rotation_enabled,
        }
    }

    pub fn rotation_interval_days(&self) -> u32 {
        self.rotation_interval_days
    }

    pub fn max_operations_before_rotation(&self) -> u64 {
        self.max_operations_before_rotation
    }

    /// Retired keys to keep on top of the current one when pruning.
    pub fn keep_old_keys_count(&self) -> usize {
        self.keep_old_keys_count
    }

    pub fn auto_rotation_enabled(&self) -> bool {
        self.auto_rotation_enabled
    }

    /// Whether a key created at `created_at` and used `operation_count` times
    /// is due for rotation at `now`.
    ///
    /// Always `false` when auto-rotation is disabled.
    pub fn is_due(&self, created_at: DateTime<Utc>, operation_count: u64, now: DateTime<Utc>) -> bool {
        if !self.auto_rotation_enabled {
            return false;
        }
        let max_age = Duration::days(i64::from(self.rotation_interval_days));
        now - created_at >= max_age || operation_count >= self.max_operations_before_rotation
    }
}
