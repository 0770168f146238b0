//! Domain types for the archiver.
//!
//! This module contains the core data structures:
//! - ArtifactId: Normalized content identifiers
//! - Token: Index records carrying artifact references
//! - ExplorationCursor: Persisted exploration position
//! - ArchiveResult / ProcessingStats: Outcomes and counters

pub mod artifact;
pub mod cursor;
pub mod result;
pub mod token;

// Re-export commonly used types
pub use artifact::{ArtifactId, IPFS_SCHEME};
pub use cursor::ExplorationCursor;
pub use result::{ArchiveResult, ProcessingStats};
pub use token::{parse_tokens, Account, Token, TokenMetadata};
