//! Shared exponential-backoff-with-jitter retry helper. Generalizes the
//! doubling-backoff loop duplicated across `openalex.rs::fetch_page` and
//! `crossref.rs::CrossrefClient::lookup` into one function every adapter
//! calls the same way.

use rand::Rng;
use std::time::Duration;
use tracing::warn;

/// What an attempt closure reports back to the retry loop.
pub enum Attempt<T> {
    /// Final result, stop retrying.
    Done(T),
    /// Retry-able failure; caller only sees a log line, never the error.
    Retry,
    /// Retry-able failure with a server-suggested wait (e.g. `Retry-After`).
    RetryAfter(u64),
}

/// Run `f` up to `max_retries + 1` times with exponential backoff and
/// jitter: `wait = min(base * 2^attempt, max) + uniform(0, base * jitter)`.
/// Returns `None` if every attempt was retry-able and exhausted.
pub async fn with_backoff<T, F, Fut>(
    label: &str,
    max_retries: u32,
    base: Duration,
    max: Duration,
    mut f: F,
) -> Option<T>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Attempt<T>>,
{
    for attempt in 0..=max_retries {
        match f(attempt).await {
            Attempt::Done(value) => return Some(value),
            Attempt::Retry => {
                if attempt == max_retries {
                    warn!(label, attempt, "giving up after exhausting retries");
                    return None;
                }
                let wait = jittered_wait(attempt, base, max);
                warn!(label, attempt, wait_ms = wait.as_millis() as u64, "retrying");
                tokio::time::sleep(wait).await;
            }
            Attempt::RetryAfter(secs) => {
                if attempt == max_retries {
                    warn!(label, attempt, "giving up after exhausting retries");
                    return None;
                }
                let wait = Duration::from_secs(secs).max(jittered_wait(attempt, base, max));
                warn!(label, attempt, wait_ms = wait.as_millis() as u64, "rate limited, retrying");
                tokio::time::sleep(wait).await;
            }
        }
    }
    None
}

fn jittered_wait(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exp = base.saturating_mul(1 << attempt.min(16)).min(max);
    let jitter_ms = rand::thread_rng().gen_range(0..=(base.as_millis() as u64 / 2).max(1));
    exp + Duration::from_millis(jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn succeeds_on_first_try() {
        let result = with_backoff("t", 3, Duration::from_millis(1), Duration::from_millis(10), |_| async {
            Attempt::Done(42)
        })
        .await;
        assert_eq!(result, Some(42));
    }

    #[tokio::test]
    async fn gives_up_after_exhausting_retries() {
        let result: Option<i32> =
            with_backoff("t", 2, Duration::from_millis(1), Duration::from_millis(5), |_| async {
                Attempt::Retry
            })
            .await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn recovers_after_a_retry() {
        let attempts = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let a = attempts.clone();
        let result = with_backoff("t", 3, Duration::from_millis(1), Duration::from_millis(5), move |_| {
            let a = a.clone();
            async move {
                if a.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                    Attempt::Retry
                } else {
                    Attempt::Done("ok")
                }
            }
        })
        .await;
        assert_eq!(result, Some("ok"));
    }
}
