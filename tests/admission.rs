//! Admission Integration Tests
//!
//! Rate window, slot bound, and at-most-once submission across restarts.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_test::{assert_pending, assert_ready_ok};
use tzarchiver::core::{ConcurrencyManager, Orchestrator, RateLimiter, StateStore};
use tzarchiver::domain::ArtifactId;

use common::{admission, exploration_settings, orchestrator, token, FakeArchive, FakeIndex};

fn id(s: &str) -> ArtifactId {
    ArtifactId::normalize(s).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_never_more_than_twelve_submissions_per_minute() {
    let archive = Arc::new(FakeArchive::default());
    let admission = admission(archive.clone(), RateLimiter::new(12), 4);

    for i in 0..30 {
        let result = admission.archive(&id(&format!("Qm{}", i))).await;
        assert!(result.success);
    }

    let times = archive.submission_times();
    assert_eq!(times.len(), 30);
    for window in times.windows(13) {
        assert!(window[12] - window[0] >= Duration::from_secs(60));
    }
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_jobs_bounded_by_capacity() {
    let temp = TempDir::new().unwrap();
    let state = Arc::new(StateStore::load(temp.path()).await);
    let archive = Arc::new(FakeArchive::slow(Duration::from_secs(30)));

    let orchestrator = Orchestrator::new(
        Arc::new(FakeIndex::default()),
        admission(
            archive.clone(),
            RateLimiter::with_window(100, Duration::from_secs(60)),
            4,
        ),
        state,
        exploration_settings(),
    );

    let tokens: Vec<_> = (0..10)
        .map(|i| token("KT1a", &i.to_string(), &format!("Qm{}", i)))
        .collect();
    let stats = orchestrator.process_batch(&tokens).await;

    assert_eq!(stats.success, 10);
    assert_eq!(archive.max_in_flight(), 4);
    assert_eq!(orchestrator.admission().slots().outstanding(), 0);
}

#[tokio::test]
async fn test_processed_artifacts_not_resubmitted_after_restart() {
    let temp = TempDir::new().unwrap();
    let tokens = vec![
        token("KT1a", "1", "QmOne"),
        token("KT1a", "2", "QmTwo"),
        token("KT1a", "3", "QmThree"),
    ];

    let first = Arc::new(FakeArchive::failing(&["QmThree"]));
    {
        let state = Arc::new(StateStore::load(temp.path()).await);
        let orchestrator = orchestrator(Arc::new(FakeIndex::default()), first.clone(), state);
        let stats = orchestrator.process_batch(&tokens).await;
        assert_eq!((stats.success, stats.failed), (2, 1));
    }

    let second = Arc::new(FakeArchive::default());
    let state = Arc::new(StateStore::load(temp.path()).await);
    let orchestrator = orchestrator(Arc::new(FakeIndex::default()), second.clone(), state);
    let stats = orchestrator.process_batch(&tokens).await;

    // Only the errored artifact is retried
    assert_eq!(stats.skipped, 2);
    assert_eq!(stats.success, 1);
    assert_eq!(second.submitted_urls(), vec!["https://gw.test/QmThree"]);
}

#[tokio::test(start_paused = true)]
async fn test_crash_mid_batch_resubmits_only_unfinished() {
    let temp = TempDir::new().unwrap();
    let tokens: Vec<_> = ["QmFast0", "QmFast1", "QmSlow2", "QmSlow3", "QmSlow4", "QmSlow5"]
        .iter()
        .enumerate()
        .map(|(i, cid)| token("KT1a", &i.to_string(), cid))
        .collect();

    // Two jobs finish after 1s; the rest are still in flight when the run dies
    let first = Arc::new(FakeArchive::with_delays(
        Duration::from_secs(300),
        &[
            ("QmFast0", Duration::from_secs(1)),
            ("QmFast1", Duration::from_secs(1)),
        ],
    ));
    {
        let state = Arc::new(StateStore::load(temp.path()).await);
        let orchestrator = orchestrator(Arc::new(FakeIndex::default()), first.clone(), state);
        let crashed =
            tokio::time::timeout(Duration::from_secs(10), orchestrator.process_batch(&tokens))
                .await;
        assert!(crashed.is_err());
    }
    assert_eq!(first.submitted_urls().len(), 6);

    let state = Arc::new(StateStore::load(temp.path()).await);
    assert_eq!(state.processed_count().await, 2);
    assert!(state.is_processed(&id("QmFast0")).await);
    assert!(state.is_processed(&id("QmFast1")).await);

    let mut unfinished = Vec::new();
    for t in &tokens {
        let artifact = t.artifact_id().unwrap();
        if !state.is_processed(&artifact).await {
            unfinished.push(format!("https://gw.test/{}", artifact.as_str()));
        }
    }

    let second = Arc::new(FakeArchive::default());
    let orchestrator = orchestrator(Arc::new(FakeIndex::default()), second.clone(), state);
    let stats = orchestrator.process_batch(&tokens).await;

    assert_eq!(stats.skipped, 2);
    assert_eq!(stats.success, 4);
    let mut resubmitted = second.submitted_urls();
    resubmitted.sort();
    unfinished.sort();
    assert_eq!(resubmitted, unfinished);
    assert_eq!(resubmitted.len(), 4);
}

#[tokio::test]
async fn test_blocked_acquire_wakes_on_release() {
    let slots = ConcurrencyManager::new(1, Duration::from_secs(120));
    let held = slots.acquire().await.unwrap();

    let mut waiting = tokio_test::task::spawn(slots.acquire());
    assert_pending!(waiting.poll());

    drop(held);
    assert!(waiting.is_woken());
    let _slot = assert_ready_ok!(waiting.poll());
    assert_eq!(slots.available(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_already_archived_consumes_no_rate_token() {
    let archive = Arc::new(FakeArchive::indexed(&["QmOld"]));
    let admission = admission(archive.clone(), RateLimiter::new(12), 4);

    for _ in 0..20 {
        let result = admission.archive(&id("QmOld")).await;
        assert!(result.already_archived);
    }

    assert_eq!(admission.current_rate().await, 0);
    assert!(archive.submitted_urls().is_empty());
}
