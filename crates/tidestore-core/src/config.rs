//! Buffer configuration
//!
//! The two flush thresholds are fixed at construction time; there is no
//! runtime reconfiguration. The defaults match what a remote storage
//! client typically wants: batches capped at 1000 changes or 1 MiB of
//! estimated payload, whichever comes first.

use crate::error::{TideError, TideResult};

/// Default maximum number of changes per batch.
pub const DEFAULT_MAX_CHANGE_COUNT: usize = 1000;

/// Default maximum estimated batch size in bytes (1 MiB).
pub const DEFAULT_MAX_ESTIMATED_SIZE: u64 = 1024 * 1024;

/// Flush thresholds for a `ChangeBuffer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferConfig {
    /// Flush when the batch reaches this many changes
    pub max_change_count: usize,
    /// Flush when the batch's estimated size reaches this many bytes
    pub max_estimated_size: u64,
}

impl BufferConfig {
    /// Create a configuration with explicit thresholds.
    pub fn new(max_change_count: usize, max_estimated_size: u64) -> Self {
        Self { max_change_count, max_estimated_size }
    }

    /// Validate all configuration parameters.
    pub fn validate(&self) -> TideResult<()> {
        if self.max_change_count == 0 {
            return Err(TideError::Configuration {
                parameter: "max_change_count",
                reason: "must be > 0".to_string(),
            });
        }
        if self.max_estimated_size == 0 {
            return Err(TideError::Configuration {
                parameter: "max_estimated_size",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_change_count: DEFAULT_MAX_CHANGE_COUNT,
            max_estimated_size: DEFAULT_MAX_ESTIMATED_SIZE,
        }
    }
}
