//! Convergence watcher.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// Polling budget for [`wait_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            interval: Duration::from_secs(5),
        }
    }
}

/// Poll `fetch` until it yields a value satisfying `predicate`.
///
/// Returns `None` once `timeout` has elapsed without a match. The interval
/// is fixed. Concurrent waits on the same target are independent.
pub async fn wait_for<T, F, Fut, P>(mut fetch: F, predicate: P, config: WaitConfig) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
    P: Fn(&T) -> bool,
{
    let started = Instant::now();

    loop {
        if let Some(value) = fetch().await {
            if predicate(&value) {
                return Some(value);
            }
        }

        let elapsed = started.elapsed();
        if elapsed >= config.timeout {
            return None;
        }

        tokio::time::sleep(config.interval.min(config.timeout - elapsed)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast(timeout_ms: u64) -> WaitConfig {
        WaitConfig {
            timeout: Duration::from_millis(timeout_ms),
            interval: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_returns_first_matching_value() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let result = wait_for(
            || async move { Some(calls.fetch_add(1, Ordering::SeqCst) + 1) },
            |n| *n >= 3,
            fast(1_000),
        )
        .await;

        assert_eq!(result, Some(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_absent_values_keep_polling() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let result = wait_for(
            || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                (n >= 2).then_some("ready")
            },
            |_| true,
            fast(1_000),
        )
        .await;

        assert_eq!(result, Some("ready"));
    }

    #[tokio::test]
    async fn test_times_out() {
        let started = Instant::now();

        let result = wait_for(|| async { Some(false) }, |ok| *ok, fast(40)).await;

        assert_eq!(result, None);
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_last_sleep_stops_at_deadline() {
        let started = Instant::now();
        let config = WaitConfig {
            timeout: Duration::from_millis(50),
            interval: Duration::from_secs(10),
        };

        let result = wait_for(|| async { Some(false) }, |ok| *ok, config).await;

        assert_eq!(result, None);
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_concurrent_waits_are_independent() {
        let calls = Arc::new(AtomicUsize::new(0));

        let wait = |calls: Arc<AtomicUsize>| async move {
            wait_for(
                || {
                    let calls = calls.clone();
                    async move { Some(calls.fetch_add(1, Ordering::SeqCst)) }
                },
                |n| *n >= 4,
                fast(1_000),
            )
            .await
        };

        let (a, b) = tokio::join!(wait(calls.clone()), wait(calls.clone()));

        assert!(a.is_some());
        assert!(b.is_some());
        assert!(calls.load(Ordering::SeqCst) >= 5);
    }
}
