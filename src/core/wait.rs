//! Bounded waiting on a condition.
//!
//! Callers that need "block until X or give up" go through [`poll_until`]
//! so the wait strategy lives in one place.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

/// Run `check` every `tick` until it yields a value or `timeout` elapses.
///
/// The check runs once immediately. Returns `None` if the deadline passes
/// without the check producing a value. The final sleep is clipped to the
/// deadline, so the call never overshoots `timeout` by more than one check.
pub async fn poll_until<T, F, Fut>(tick: Duration, timeout: Duration, mut check: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + timeout;

    loop {
        if let Some(value) = check().await {
            return Some(value);
        }

        let now = Instant::now();
        if now >= deadline {
            return None;
        }

        sleep(tick.min(deadline - now)).await;
    }
}
