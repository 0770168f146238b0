//! Bidirectional deterministic walk over the index offset space.
//!
//! An epoch starts at a seed in the middle half of `[0, max_tokens)` and
//! steps outward one batch at a time, alternating above and below the seed:
//!
//! ```text
//! seed, seed + b, seed - b, seed + 2b, seed - 2b, ...
//! ```
//!
//! Offsets that fall outside the space wrap around. The cursor is persisted
//! after every step, so a restart continues with the next untried offset.
//! After a run of empty batches the walk reseeds to escape sparse regions.

use std::ops::Range;
use std::sync::Arc;

use rand::Rng;
use tracing::{info, warn};

use crate::config::ExplorationSettings;
use crate::domain::ExplorationCursor;

use super::state_store::StateStore;

/// Seeds are drawn from `[max/4, 3*max/4)`
pub fn seed_band(max_tokens: u64) -> Range<u64> {
    (max_tokens / 4)..(max_tokens * 3 / 4)
}

/// Uniform random seed in the middle band
pub fn random_seed(max_tokens: u64) -> u64 {
    let band = seed_band(max_tokens);
    if band.is_empty() {
        return max_tokens / 2;
    }
    rand::rng().random_range(band)
}

/// Advance `cursor` by one step and return the offset it lands on.
///
/// The seed itself is visited once, at iteration zero. After that each
/// iteration `k` yields `seed + k*b` then `seed - k*b`; the iteration count
/// only increases after the step below the seed. The result is always in
/// `[0, max_tokens)`.
pub fn advance(cursor: &mut ExplorationCursor, batch_size: u64, max_tokens: u64) -> u64 {
    let seed = i128::from(cursor.seed);
    let step = i128::from(cursor.iteration_count) * i128::from(batch_size);

    let target = if cursor.iteration_count == 0 {
        cursor.iteration_count = 1;
        cursor.is_positive_direction = true;
        seed
    } else if cursor.is_positive_direction {
        cursor.is_positive_direction = false;
        seed + step
    } else {
        cursor.is_positive_direction = true;
        cursor.iteration_count += 1;
        seed - step
    };

    // Equivalent to one add-back on underflow / one subtract on overflow while
    // the step stays within the space; keeps the bound once it does not.
    target.rem_euclid(i128::from(max_tokens)) as u64
}

/// Produces successive batch offsets and keeps the cursor persisted
pub struct ExplorationEngine {
    cursor: ExplorationCursor,
    max_tokens: u64,
    batch_size: u64,
    empty_batch_threshold: u32,
    consecutive_empty: u32,
    state: Arc<StateStore>,
}

impl ExplorationEngine {
    /// Continue the persisted walk, or start a fresh epoch if there is none
    pub async fn resume(state: Arc<StateStore>, settings: &ExplorationSettings) -> Self {
        match state.cursor().await {
            Some(cursor) => {
                info!(
                    seed = cursor.seed,
                    iteration = cursor.iteration_count,
                    positive = cursor.is_positive_direction,
                    "Resuming exploration"
                );
                Self::with_cursor(state, settings, cursor)
            }
            None => {
                let cursor = ExplorationCursor::new(random_seed(settings.max_tokens));
                info!(seed = cursor.seed, "Starting new exploration epoch");

                let engine = Self::with_cursor(state, settings, cursor);
                engine.persist().await;
                engine
            }
        }
    }

    /// Start from an explicit cursor (not persisted until the first step)
    pub fn with_cursor(
        state: Arc<StateStore>,
        settings: &ExplorationSettings,
        cursor: ExplorationCursor,
    ) -> Self {
        Self {
            cursor,
            max_tokens: settings.max_tokens,
            batch_size: settings.batch_size,
            empty_batch_threshold: settings.empty_batch_threshold,
            consecutive_empty: 0,
            state,
        }
    }

    pub fn cursor(&self) -> ExplorationCursor {
        self.cursor
    }

    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    /// Empty batches seen since the last non-empty one
    pub fn consecutive_empty(&self) -> u32 {
        self.consecutive_empty
    }

    /// Offset of the next batch to fetch
    pub async fn next_offset(&mut self) -> u64 {
        let offset = advance(&mut self.cursor, self.batch_size, self.max_tokens);
        self.persist().await;
        offset
    }

    /// Report how many tokens the last batch returned.
    ///
    /// Returns true if this report triggered a reseed.
    pub async fn record_batch(&mut self, fetched: usize) -> bool {
        if fetched > 0 {
            self.consecutive_empty = 0;
            return false;
        }

        self.consecutive_empty += 1;
        if self.consecutive_empty < self.empty_batch_threshold {
            return false;
        }

        warn!(
            empty_batches = self.consecutive_empty,
            "Too many empty batches, reseeding exploration"
        );
        self.reseed().await;
        true
    }

    /// Start a new epoch from a fresh random seed
    pub async fn reseed(&mut self) {
        self.cursor = ExplorationCursor::new(random_seed(self.max_tokens));
        self.consecutive_empty = 0;
        info!(seed = self.cursor.seed, "Starting new exploration epoch");
        self.persist().await;
    }

    async fn persist(&self) {
        if let Err(e) = self.state.save_cursor(self.cursor).await {
            warn!(error = %e, "Failed to persist exploration cursor");
        }
    }
}
