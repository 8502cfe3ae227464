//! Configuration structures for the Keel index.

use serde::{Deserialize, Serialize};

/// Configuration for an index instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Enable fsync after page writes.
    pub fsync_enabled: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            fsync_enabled: true,
        }
    }
}
