//! Persisted exploration position.

use serde::{Deserialize, Serialize};

/// Minimal state needed to resume the bidirectional walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorationCursor {
    /// Center of the current epoch
    pub seed: u64,

    /// Number of completed +/- step pairs
    pub iteration_count: u64,

    /// Whether the next step goes above the seed
    pub is_positive_direction: bool,
}

impl ExplorationCursor {
    /// Start a fresh epoch at `seed`
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            iteration_count: 0,
            is_positive_direction: true,
        }
    }
}
