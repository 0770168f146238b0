//! Admission of single artifacts into the archive service.
//!
//! One call to [`ArchivalAdmission::admit`] produces exactly one
//! [`ArchiveResult`], either immediately ([`Admission::Settled`]) or once the
//! capture job finishes ([`Admission::Submitted`]). A submitted job owns its
//! concurrency slot until completion is observed, whatever the outcome.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::adapters::{ArchiveService, CaptureState, CaptureStatus, JobHandle, SaveOptions};
use crate::config::ArchiverConfig;
use crate::domain::{ArchiveResult, ArtifactId};

use super::concurrency::{ConcurrencyManager, SlotGuard};
use super::rate_limiter::RateLimiter;

/// Gates and submits artifacts to the archive service
pub struct ArchivalAdmission {
    service: Arc<dyn ArchiveService>,
    gateway: String,
    options: SaveOptions,
    rate_limiter: Mutex<RateLimiter>,
    slots: ConcurrencyManager,
}

/// What `admit` produced
#[derive(Debug)]
pub enum Admission {
    /// Final result known without waiting on a job
    Settled(ArchiveResult),
    /// Job accepted by the service; completion still outstanding
    Submitted(Submission),
    /// Cancelled before anything was submitted
    Cancelled(ArtifactId),
}

impl Admission {
    /// Resolve to the final result, awaiting the job if one was submitted
    pub async fn outcome(self) -> ArchiveResult {
        match self {
            Admission::Settled(result) => result,
            Admission::Submitted(submission) => submission.complete().await,
            Admission::Cancelled(id) => ArchiveResult::failed(id, "cancelled before submission"),
        }
    }
}

/// An in-flight capture job holding a concurrency slot
pub struct Submission {
    id: ArtifactId,
    job: JobHandle,
    service: Arc<dyn ArchiveService>,
    slot: SlotGuard,
}

impl std::fmt::Debug for Submission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submission")
            .field("id", &self.id)
            .field("job", &self.job)
            .finish_non_exhaustive()
    }
}

impl Submission {
    /// Wait for the job, release the slot, and classify the outcome
    pub async fn complete(self) -> ArchiveResult {
        let Submission {
            id,
            job,
            service,
            slot,
        } = self;

        let status = service.await_completion(&job).await;
        slot.release();

        match status {
            Ok(status) => classify(id, status),
            Err(e) => {
                error!(artifact = %id, job_id = %job.job_id, error = %e, "Failed to track capture job");
                ArchiveResult::failed(id, e.to_string())
            }
        }
    }
}

/// Map a completion notification onto an archive result.
///
/// A pending job counts as success: it does not block progress and the
/// archive will finish it on its own.
pub fn classify(id: ArtifactId, status: CaptureStatus) -> ArchiveResult {
    match status.state {
        CaptureState::Success => {
            info!(artifact = %id, "Successfully archived");
            ArchiveResult::archived(id, status.message)
        }
        CaptureState::Pending => {
            warn!(artifact = %id, "Archiving still in progress");
            ArchiveResult::archived(id, status.message)
        }
        CaptureState::Error => {
            let message = status
                .message
                .clone()
                .unwrap_or_else(|| "capture failed".to_string());
            error!(artifact = %id, error = %message, "Failed to archive");
            ArchiveResult {
                id,
                success: false,
                already_archived: false,
                message: status.message,
                error: Some(message),
            }
        }
    }
}

impl ArchivalAdmission {
    /// Build from configuration
    pub fn new(service: Arc<dyn ArchiveService>, config: &ArchiverConfig) -> Self {
        Self::with_gates(
            service,
            config.ipfs_gateway.clone(),
            SaveOptions::from_settings(&config.wayback),
            RateLimiter::new(config.wayback.rate_limit_per_minute),
            ConcurrencyManager::new(
                config.wayback.max_concurrent,
                config.wayback.slot_timeout(),
            ),
        )
    }

    /// Build with explicit gates
    pub fn with_gates(
        service: Arc<dyn ArchiveService>,
        gateway: String,
        options: SaveOptions,
        rate_limiter: RateLimiter,
        slots: ConcurrencyManager,
    ) -> Self {
        Self {
            service,
            gateway,
            options,
            rate_limiter: Mutex::new(rate_limiter),
            slots,
        }
    }

    /// The concurrency gate (for observation)
    pub fn slots(&self) -> &ConcurrencyManager {
        &self.slots
    }

    /// Admissions in the current rate window
    pub async fn current_rate(&self) -> usize {
        self.rate_limiter.lock().await.current_rate()
    }

    /// Locator the archive is asked to capture
    pub fn artifact_url(&self, id: &ArtifactId) -> String {
        id.gateway_url(&self.gateway)
    }

    /// Pre-check, gate, and submit one artifact.
    ///
    /// Already-archived artifacts settle without touching either gate. Gate
    /// waits happen here, so callers feel back-pressure directly. If `cancel`
    /// fires before submission, the waits end early with
    /// [`Admission::Cancelled`] and neither gate is consumed.
    pub async fn admit(&self, id: &ArtifactId, cancel: &CancellationToken) -> Admission {
        if cancel.is_cancelled() {
            return Admission::Cancelled(id.clone());
        }

        let url = self.artifact_url(id);

        match self.service.check_indexed(&url).await {
            Ok(true) => {
                info!(artifact = %id, "Already archived");
                return Admission::Settled(ArchiveResult::already_archived(id.clone()));
            }
            Ok(false) => {}
            Err(e) => {
                warn!(artifact = %id, error = %e, "Archive pre-check failed, submitting anyway");
            }
        }

        // Held across both gates so concurrent callers cannot overfill the window
        let mut limiter = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Admission::Cancelled(id.clone()),
            limiter = self.rate_limiter.lock() => limiter,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Admission::Cancelled(id.clone()),
            _ = limiter.wait_if_needed() => {}
        }

        let acquired = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Admission::Cancelled(id.clone()),
            acquired = self.slots.acquire() => acquired,
        };

        let slot = match acquired {
            Ok(slot) => slot,
            Err(e) => {
                warn!(artifact = %id, error = %e, "No archive slot available");
                return Admission::Settled(ArchiveResult::failed(id.clone(), e.to_string()));
            }
        };

        limiter.record();
        let rate = limiter.current_rate();
        let limit = limiter.max_requests();
        drop(limiter);

        info!(artifact = %id, rate, limit, "Submitting for archiving");

        match self.service.submit(&url, &self.options).await {
            Ok(job) => Admission::Submitted(Submission {
                id: id.clone(),
                job,
                service: self.service.clone(),
                slot,
            }),
            Err(e) => {
                slot.release();
                error!(artifact = %id, error = %e, "Failed to submit for archiving");
                Admission::Settled(ArchiveResult::failed(id.clone(), e.to_string()))
            }
        }
    }

    /// Admit and wait for the final result
    pub async fn archive(&self, id: &ArtifactId) -> ArchiveResult {
        self.admit(id, &CancellationToken::new())
            .await
            .outcome()
            .await
    }
}
