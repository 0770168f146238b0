//! Shared fakes for integration tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::time::Instant;

use tzarchiver::adapters::{
    ArchiveService, CaptureState, CaptureStatus, JobHandle, SaveOptions, TokenIndex,
};
use tzarchiver::config::{ExplorationSettings, WaybackSettings};
use tzarchiver::core::{ArchivalAdmission, ConcurrencyManager, Orchestrator, RateLimiter, StateStore};
use tzarchiver::domain::{Account, Token, TokenMetadata};

pub const GATEWAY: &str = "https://gw.test";

/// Token carrying an IPFS artifact
pub fn token(contract: &str, token_id: &str, cid: &str) -> Token {
    Token {
        contract: Some(Account {
            alias: None,
            address: Some(contract.to_string()),
        }),
        token_id: Some(token_id.to_string()),
        metadata: Some(TokenMetadata {
            artifact_uri: Some(format!("ipfs://{}", cid)),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn exploration_settings() -> ExplorationSettings {
    ExplorationSettings {
        max_tokens: 1_000_000,
        batch_size: 100,
        delay_ms: 500,
        empty_batch_threshold: 5,
    }
}

// ============================================================================
// Index
// ============================================================================

/// In-memory index
#[derive(Default)]
pub struct FakeIndex {
    pub minted: Vec<Token>,
    pub held: Vec<Token>,
    pub contract: Vec<Token>,
    pub fail_held: bool,
    /// Tokens returned per exploration offset (missing offsets are empty)
    pub by_offset: HashMap<u64, Vec<Token>>,
    /// Serve two synthetic tokens at every offset
    pub everywhere: bool,
    pub offsets: Mutex<Vec<u64>>,
}

#[async_trait]
impl TokenIndex for FakeIndex {
    async fn minted_by(&self, _creator: &str, limit: usize) -> Result<Vec<Token>> {
        Ok(self.minted.iter().take(limit).cloned().collect())
    }

    async fn held_by(&self, _holder: &str, limit: usize) -> Result<Vec<Token>> {
        if self.fail_held {
            bail!("index unavailable");
        }
        Ok(self.held.iter().take(limit).cloned().collect())
    }

    async fn in_contract(&self, _contract: &str, limit: usize) -> Result<Vec<Token>> {
        Ok(self.contract.iter().take(limit).cloned().collect())
    }

    async fn tokens_at(&self, offset: u64, limit: usize) -> Result<Vec<Token>> {
        self.offsets.lock().unwrap().push(offset);

        if self.everywhere {
            return Ok((0..2)
                .map(|i| token("KT1x", &format!("{}-{}", offset, i), &format!("Qm{}x{}", offset, i)))
                .take(limit)
                .collect());
        }

        Ok(self.by_offset.get(&offset).cloned().unwrap_or_default())
    }
}

// ============================================================================
// Archive
// ============================================================================

/// In-memory archive service; identifiers are matched on the URL suffix
#[derive(Default)]
pub struct FakeArchive {
    pub indexed: HashSet<String>,
    pub failing: HashSet<String>,
    pub completion_delay: Duration,
    /// Per-identifier completion delay, overriding `completion_delay`
    pub delays: HashMap<String, Duration>,
    pub submissions: Mutex<Vec<(String, Instant)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeArchive {
    pub fn indexed(cids: &[&str]) -> Self {
        Self {
            indexed: cids.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn failing(cids: &[&str]) -> Self {
        Self {
            failing: cids.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            completion_delay: delay,
            ..Default::default()
        }
    }

    pub fn with_delays(default: Duration, delays: &[(&str, Duration)]) -> Self {
        Self {
            completion_delay: default,
            delays: delays.iter().map(|(c, d)| (c.to_string(), *d)).collect(),
            ..Default::default()
        }
    }

    pub fn submitted_urls(&self) -> Vec<String> {
        self.submissions
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    pub fn submission_times(&self) -> Vec<Instant> {
        self.submissions.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

fn cid_of(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

#[async_trait]
impl ArchiveService for FakeArchive {
    async fn check_indexed(&self, url: &str) -> Result<bool> {
        Ok(self.indexed.contains(cid_of(url)))
    }

    async fn submit(&self, url: &str, _options: &SaveOptions) -> Result<JobHandle> {
        self.submissions
            .lock()
            .unwrap()
            .push((url.to_string(), Instant::now()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        Ok(JobHandle {
            job_id: format!("job-{}", cid_of(url)),
            url: url.to_string(),
        })
    }

    async fn await_completion(&self, job: &JobHandle) -> Result<CaptureStatus> {
        let delay = self
            .delays
            .get(cid_of(&job.url))
            .copied()
            .unwrap_or(self.completion_delay);
        tokio::time::sleep(delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(cid_of(&job.url)) {
            return Ok(CaptureStatus::new(
                CaptureState::Error,
                Some("capture blocked".to_string()),
            ));
        }
        Ok(CaptureStatus::new(CaptureState::Success, None))
    }
}

// ============================================================================
// Wiring
// ============================================================================

pub fn admission(
    archive: Arc<FakeArchive>,
    limiter: RateLimiter,
    capacity: usize,
) -> ArchivalAdmission {
    ArchivalAdmission::with_gates(
        archive,
        GATEWAY.to_string(),
        SaveOptions::from_settings(&WaybackSettings::default()),
        limiter,
        ConcurrencyManager::new(capacity, Duration::from_secs(120)),
    )
}

pub fn orchestrator(
    index: Arc<FakeIndex>,
    archive: Arc<FakeArchive>,
    state: Arc<StateStore>,
) -> Orchestrator {
    Orchestrator::new(
        index,
        admission(archive, RateLimiter::new(12), 4),
        state,
        exploration_settings(),
    )
}
