//! Engine configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration shared by the whole environment stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    /// Number of parallel workers the scheduler may use.
    pub number_of_workers: usize,
    /// Directory snapshots are stored to and loaded from, if any.
    pub snapshot_directory: Option<PathBuf>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            number_of_workers: 1,
            snapshot_directory: None,
        }
    }
}

impl Configuration {
    /// A configuration with the given worker count and no snapshot directory.
    pub fn with_workers(number_of_workers: usize) -> Self {
        Self {
            number_of_workers: number_of_workers.max(1),
            snapshot_directory: None,
        }
    }
}
