//! Bounded slots in front of the capacity-limited archive service.
//!
//! A slot is held by a [`SlotGuard`] and released when the guard drops, so
//! every successful acquisition is matched by exactly one release on every
//! path, including early returns and panics.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Default number of concurrent captures
pub const DEFAULT_CAPACITY: usize = 4;

/// Default bound on waiting for a slot
pub const DEFAULT_SLOT_TIMEOUT: Duration = Duration::from_secs(120);

/// Admission gate failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("slot timeout after {waited:?}")]
    SlotTimeout { waited: Duration },

    #[error("concurrency gate closed")]
    Closed,
}

/// Semaphore over a fixed number of slots with a bounded wait
#[derive(Debug, Clone)]
pub struct ConcurrencyManager {
    capacity: usize,
    slot_timeout: Duration,
    slots: Arc<Semaphore>,
}

impl ConcurrencyManager {
    pub fn new(capacity: usize, slot_timeout: Duration) -> Self {
        Self {
            capacity,
            slot_timeout,
            slots: Arc::new(Semaphore::new(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free slots right now
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Slots currently held
    pub fn outstanding(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }

    /// Take a slot, waiting up to the configured timeout for one to free up
    pub async fn acquire(&self) -> Result<SlotGuard, AdmissionError> {
        if self.available() == 0 {
            warn!(
                capacity = self.capacity,
                "All archive slots busy, waiting for one to free up"
            );
        }

        match timeout(self.slot_timeout, self.slots.clone().acquire_owned()).await {
            Ok(Ok(permit)) => {
                debug!(outstanding = self.outstanding(), "Archive slot acquired");
                Ok(SlotGuard { _permit: permit })
            }
            Ok(Err(_)) => Err(AdmissionError::Closed),
            Err(_) => Err(AdmissionError::SlotTimeout {
                waited: self.slot_timeout,
            }),
        }
    }
}

impl Default for ConcurrencyManager {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_SLOT_TIMEOUT)
    }
}

/// A held slot; dropping it releases the slot
#[derive(Debug)]
pub struct SlotGuard {
    _permit: OwnedSemaphorePermit,
}

impl SlotGuard {
    /// Release the slot now instead of at end of scope
    pub fn release(self) {}
}
