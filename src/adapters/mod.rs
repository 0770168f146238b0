//! Adapter interfaces for external systems.
//!
//! The core talks to two services through these traits:
//! - [`TokenIndex`]: the blockchain index (TzKT)
//! - [`ArchiveService`]: the web archive (Wayback Machine, Save Page Now 2)

pub mod tzkt;
pub mod wayback;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::WaybackSettings;
use crate::domain::Token;

// Re-export the concrete clients
pub use tzkt::TzktClient;
pub use wayback::WaybackClient;

/// Query shapes served by the blockchain index
#[async_trait]
pub trait TokenIndex: Send + Sync {
    /// Tokens first minted by `creator`
    async fn minted_by(&self, creator: &str, limit: usize) -> Result<Vec<Token>>;

    /// Tokens currently held (non-zero balance) by `holder`
    async fn held_by(&self, holder: &str, limit: usize) -> Result<Vec<Token>>;

    /// Tokens belonging to the contract at `contract`
    async fn in_contract(&self, contract: &str, limit: usize) -> Result<Vec<Token>>;

    /// Tokens carrying an artifact, starting at `offset` in index order
    async fn tokens_at(&self, offset: u64, limit: usize) -> Result<Vec<Token>>;
}

/// Capture options sent with each submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOptions {
    /// Seconds the capture runs page scripts
    pub js_behavior_timeout: u64,
    /// Let the service delay making the capture publicly available
    pub delay_availability: bool,
    /// Skip the capture if one newer than this exists
    pub if_not_archived_within: Duration,
}

impl SaveOptions {
    pub fn from_settings(settings: &WaybackSettings) -> Self {
        Self {
            js_behavior_timeout: settings.js_behavior_timeout,
            delay_availability: settings.delay_availability,
            if_not_archived_within: Duration::from_secs(settings.if_not_archived_within_seconds),
        }
    }
}

/// Handle to a submitted capture job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: String,
    pub url: String,
}

/// Terminal (or last observed) state of a capture job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Success,
    Pending,
    Error,
}

/// Completion notification for a capture job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureStatus {
    pub state: CaptureState,
    pub message: Option<String>,
}

impl CaptureStatus {
    pub fn new(state: CaptureState, message: Option<String>) -> Self {
        Self { state, message }
    }
}

/// Web archive submission and status service
#[async_trait]
pub trait ArchiveService: Send + Sync {
    /// Whether the archive already holds a capture of `url`
    async fn check_indexed(&self, url: &str) -> Result<bool>;

    /// Submit a capture job
    async fn submit(&self, url: &str, options: &SaveOptions) -> Result<JobHandle>;

    /// Wait for the job to finish (or stop reporting progress)
    async fn await_completion(&self, job: &JobHandle) -> Result<CaptureStatus>;
}
