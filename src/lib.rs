//! tzarchiver - Archive Tezos NFT artifacts to the Wayback Machine
//!
//! Discovers tokens through the TzKT index and submits their IPFS-hosted
//! artifacts to the Wayback Machine's Save Page Now service.
//!
//! # Architecture
//!
//! - Every artifact is admitted through two gates: a sliding-window rate
//!   limit and a bounded pool of in-flight capture slots
//! - Completed artifacts are persisted, so no artifact is archived twice
//!   across restarts
//! - Exploration walks the index outward from a random seed, alternating
//!   above and below it, and resumes from its persisted cursor
//!
//! # Modules
//!
//! - `adapters`: External services (TzKT, Wayback Machine)
//! - `core`: Admission gates, state, exploration, orchestration
//! - `domain`: Data structures (Token, ArtifactId, ArchiveResult)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Archive everything one wallet minted, holds, or owns
//! tzarchiver --wallet tz1... --limit 500
//!
//! # Explore the whole index until Ctrl-C
//! tzarchiver
//!
//! # Show progress
//! tzarchiver status
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use adapters::{ArchiveService, TokenIndex, TzktClient, WaybackClient};
pub use config::{ArchiveCredentials, ArchiverConfig};
pub use core::{ArchivalAdmission, ExplorationEngine, Orchestrator, StateStore};
pub use domain::{ArchiveResult, ArtifactId, ExplorationCursor, ProcessingStats, Token};
