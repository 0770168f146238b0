//! Main orchestrator for discovery and archival.
//!
//! Drives batches of tokens through admission, routes each result into the
//! state store, and accumulates statistics. Provides the two entry points:
//! wallet mode and continuous exploration.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use tokio::task::{JoinError, JoinSet};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::TokenIndex;
use crate::config::ExplorationSettings;
use crate::domain::{ArchiveResult, ArtifactId, ProcessingStats, Token};

use super::admission::{Admission, ArchivalAdmission};
use super::exploration::ExplorationEngine;
use super::state_store::StateStore;

/// Main archival orchestrator
pub struct Orchestrator {
    index: Arc<dyn TokenIndex>,
    admission: ArchivalAdmission,
    state: Arc<StateStore>,
    exploration: ExplorationSettings,
}

impl Orchestrator {
    /// Create a new orchestrator
    pub fn new(
        index: Arc<dyn TokenIndex>,
        admission: ArchivalAdmission,
        state: Arc<StateStore>,
        exploration: ExplorationSettings,
    ) -> Self {
        Self {
            index,
            admission,
            state,
            exploration,
        }
    }

    pub fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    pub fn admission(&self) -> &ArchivalAdmission {
        &self.admission
    }

    /// Archive every not-yet-processed artifact referenced by `tokens`.
    ///
    /// Identifiers are admitted in extraction order; results are applied to
    /// the state store as each job completes. Returns once every submission
    /// from this batch has settled.
    pub async fn process_batch(&self, tokens: &[Token]) -> ProcessingStats {
        self.process_batch_until(tokens, &CancellationToken::new())
            .await
    }

    /// [`Orchestrator::process_batch`] that stops admitting once `cancel` fires.
    ///
    /// Jobs already submitted still run to completion and are recorded;
    /// identifiers not yet admitted are left for a later run and are not
    /// counted as processed or skipped.
    #[instrument(skip(self, tokens, cancel), fields(tokens = tokens.len()))]
    pub async fn process_batch_until(
        &self,
        tokens: &[Token],
        cancel: &CancellationToken,
    ) -> ProcessingStats {
        let mut stats = ProcessingStats {
            total: tokens.len(),
            ..Default::default()
        };

        let ids = extract_artifact_ids(tokens);
        info!(artifacts = ids.len(), "Processing batch");

        let mut seen: HashSet<ArtifactId> = HashSet::new();
        let mut in_flight: JoinSet<ArchiveResult> = JoinSet::new();

        for (position, id) in ids.iter().enumerate() {
            if !seen.insert(id.clone()) || self.state.is_processed(id).await {
                debug!(artifact = %id, "Already processed, skipping");
                stats.skipped += 1;
                continue;
            }

            match self.admission.admit(id, cancel).await {
                Admission::Cancelled(_) => {
                    warn!(
                        remaining = ids.len() - position,
                        in_flight = in_flight.len(),
                        "Cancelled, draining submitted jobs"
                    );
                    break;
                }
                Admission::Settled(result) => {
                    stats.processed += 1;
                    record_result(&self.state, &result).await;
                    stats.record(&result);
                }
                Admission::Submitted(submission) => {
                    stats.processed += 1;
                    let state = self.state.clone();
                    in_flight.spawn(async move {
                        let result = submission.complete().await;
                        record_result(&state, &result).await;
                        result
                    });
                }
            }

            while let Some(joined) = in_flight.try_join_next() {
                tally(&mut stats, joined);
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            tally(&mut stats, joined);
        }

        stats
    }

    /// Archive everything an account minted, holds, or has in its contract
    #[instrument(skip(self))]
    pub async fn process_wallet(&self, address: &str, limit: usize) -> ProcessingStats {
        info!("Processing wallet");

        let mut all = Vec::new();

        info!("Fetching minted tokens");
        all.extend(fetch_or_empty("minted", self.index.minted_by(address, limit).await));

        info!("Fetching owned tokens");
        all.extend(fetch_or_empty("owned", self.index.held_by(address, limit).await));

        info!("Fetching contract tokens");
        all.extend(fetch_or_empty("contract", self.index.in_contract(address, limit).await));

        let unique = dedupe_tokens(all);
        info!(unique = unique.len(), "Total unique tokens");

        self.process_batch(&unique).await
    }

    /// Explore the index until `cancel` fires.
    ///
    /// Cancellation is observed between iterations, during the pause, and
    /// between admissions inside a batch; submitted jobs are always drained
    /// first. Returns the accumulated statistics.
    #[instrument(skip_all)]
    pub async fn explore(&self, cancel: CancellationToken) -> ProcessingStats {
        warn!("Starting continuous exploration");

        let mut engine = ExplorationEngine::resume(self.state.clone(), &self.exploration).await;
        let mut totals = ProcessingStats::default();
        let mut iteration = 0u64;

        while !cancel.is_cancelled() {
            iteration += 1;

            let pause = match self.explore_step(&mut engine, &cancel).await {
                Ok(Some(stats)) => {
                    info!(iteration, %stats, "Exploration batch complete");
                    totals.merge(&stats);
                    self.exploration.delay()
                }
                Ok(None) => self.exploration.delay(),
                Err(e) => {
                    error!(iteration, error = %e, "Exploration iteration failed");
                    self.exploration.error_backoff()
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(pause) => {}
            }
        }

        info!(iterations = iteration, %totals, "Exploration stopped");
        totals
    }

    /// One exploration iteration: fetch the next batch and process it.
    ///
    /// Returns `Ok(None)` when the batch came back empty.
    pub async fn explore_step(
        &self,
        engine: &mut ExplorationEngine,
        cancel: &CancellationToken,
    ) -> Result<Option<ProcessingStats>> {
        let offset = engine.next_offset().await;
        let limit = usize::try_from(engine.batch_size()).unwrap_or(usize::MAX);
        info!(offset, limit, "Fetching exploration batch");

        let tokens = self.index.tokens_at(offset, limit).await?;
        engine.record_batch(tokens.len()).await;

        if tokens.is_empty() {
            warn!(offset, "No tokens returned at offset");
            return Ok(None);
        }

        Ok(Some(self.process_batch_until(&tokens, cancel).await))
    }
}

/// Normalized identifiers of all content-addressed artifacts, in token order
pub fn extract_artifact_ids(tokens: &[Token]) -> Vec<ArtifactId> {
    tokens.iter().filter_map(Token::artifact_id).collect()
}

/// Drop repeated (contract, token id) pairs, keeping the first occurrence
pub fn dedupe_tokens(tokens: Vec<Token>) -> Vec<Token> {
    let mut seen = HashSet::new();
    tokens
        .into_iter()
        .filter(|token| seen.insert(token.key()))
        .collect()
}

fn fetch_or_empty(kind: &str, fetched: Result<Vec<Token>>) -> Vec<Token> {
    match fetched {
        Ok(tokens) => {
            info!(kind, count = tokens.len(), "Fetched tokens");
            tokens
        }
        Err(e) => {
            error!(kind, error = %e, "Failed to fetch tokens");
            Vec::new()
        }
    }
}

/// Persist a result: successes to `processed`, failures to `errored`
async fn record_result(state: &StateStore, result: &ArchiveResult) {
    let persisted = if result.success {
        state.mark_processed(&result.id).await
    } else {
        state.mark_errored(&result.id).await
    };

    if let Err(e) = persisted {
        warn!(artifact = %result.id, error = %e, "Result kept in memory only");
    }
}

fn tally(stats: &mut ProcessingStats, joined: Result<ArchiveResult, JoinError>) {
    match joined {
        Ok(result) => stats.record(&result),
        Err(e) => {
            error!(error = %e, "Archive completion task failed");
            stats.failed += 1;
        }
    }
}
