//! Core discovery and admission logic.
//!
//! This module contains:
//! - RateLimiter: Sliding-window submission rate gate
//! - ConcurrencyManager: Bounded in-flight capture slots
//! - StateStore: Persisted completion sets and exploration cursor
//! - ArchivalAdmission: Per-artifact pre-check, gating, and submission
//! - ExplorationEngine: Resumable bidirectional walk over the index
//! - Orchestrator: Batch processing and the two run modes

pub mod admission;
pub mod concurrency;
pub mod exploration;
pub mod orchestrator;
pub mod rate_limiter;
pub mod state_store;
pub mod wait;

// Re-export commonly used types
pub use admission::{classify, Admission, ArchivalAdmission, Submission};
pub use concurrency::{AdmissionError, ConcurrencyManager, SlotGuard};
pub use exploration::{advance, random_seed, seed_band, ExplorationEngine};
pub use orchestrator::{dedupe_tokens, extract_artifact_ids, Orchestrator};
pub use rate_limiter::RateLimiter;
pub use state_store::{StateError, StateStore};
pub use wait::poll_until;
