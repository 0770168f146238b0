//! Per-submission results and per-batch statistics.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::artifact::ArtifactId;

/// Outcome of one archival attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveResult {
    pub id: ArtifactId,
    pub success: bool,
    pub already_archived: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ArchiveResult {
    /// The archive already holds a capture; nothing was submitted
    pub fn already_archived(id: ArtifactId) -> Self {
        Self {
            id,
            success: true,
            already_archived: true,
            message: None,
            error: None,
        }
    }

    /// Submitted and accepted (captured or still pending)
    pub fn archived(id: ArtifactId, message: Option<String>) -> Self {
        Self {
            id,
            success: true,
            already_archived: false,
            message,
            error: None,
        }
    }

    /// Submission failed
    pub fn failed(id: ArtifactId, error: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            already_archived: false,
            message: None,
            error: Some(error.into()),
        }
    }
}

/// Counters for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStats {
    /// Tokens in the batch
    pub total: usize,
    /// Identifiers sent through admission
    pub processed: usize,
    /// Identifiers skipped because they were already handled
    pub skipped: usize,
    pub success: usize,
    pub failed: usize,
    pub already_archived: usize,
}

impl ProcessingStats {
    /// Count a settled result
    pub fn record(&mut self, result: &ArchiveResult) {
        if result.already_archived {
            self.already_archived += 1;
        } else if result.success {
            self.success += 1;
        } else {
            self.failed += 1;
        }
    }

    /// Add another batch's counters into this one
    pub fn merge(&mut self, other: &ProcessingStats) {
        self.total += other.total;
        self.processed += other.processed;
        self.skipped += other.skipped;
        self.success += other.success;
        self.failed += other.failed;
        self.already_archived += other.already_archived;
    }
}

impl fmt::Display for ProcessingStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tokens: {}, Processed: {}, Skipped: {}, Successful: {}, Failed: {}, Already archived: {}",
            self.total,
            self.processed,
            self.skipped,
            self.success,
            self.failed,
            self.already_archived
        )
    }
}
