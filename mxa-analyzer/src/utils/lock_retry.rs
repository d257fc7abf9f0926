//! Retry policy for SQLite writes that collide with another writer
//!
//! WAL mode keeps readers unblocked, but a second writer still sees
//! "database is locked". `LockRetry` re-runs the whole write with a doubling
//! pause until the configured wait budget (`analysis.db_max_lock_wait_ms`)
//! is spent. Any other error is returned on the first attempt.

use mxa_common::{Error, Result};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct LockRetry {
    budget: Duration,
    first_pause: Duration,
    max_pause: Duration,
}

impl LockRetry {
    pub fn new(max_wait_ms: u64) -> Self {
        Self {
            budget: Duration::from_millis(max_wait_ms),
            first_pause: Duration::from_millis(10),
            max_pause: Duration::from_secs(1),
        }
    }

    pub fn with_pauses(mut self, first: Duration, max: Duration) -> Self {
        self.first_pause = first;
        self.max_pause = max.max(first);
        self
    }

    /// Pause before attempt `failed + 1`, after `failed` locked attempts
    fn pause_after(&self, failed: u32) -> Duration {
        let factor = 1u32.checked_shl(failed.saturating_sub(1)).unwrap_or(u32::MAX);
        self.first_pause
            .checked_mul(factor)
            .map_or(self.max_pause, |pause| pause.min(self.max_pause))
    }

    /// Run `write` until it succeeds, fails with a non-lock error, or the
    /// budget runs out. `write` must be safe to repeat from scratch.
    pub async fn run<W, Fut, T>(&self, label: &str, mut write: W) -> Result<T>
    where
        W: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let mut failed = 0u32;

        loop {
            let err = match write().await {
                Ok(value) => {
                    if failed > 0 {
                        debug!(write = label, retries = failed, "Locked write went through");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_lock_contention() => err,
                Err(err) => return Err(err),
            };
            failed += 1;

            let waited = started.elapsed();
            if waited >= self.budget {
                warn!(
                    write = label,
                    attempts = failed,
                    waited_ms = waited.as_millis() as u64,
                    error = %err,
                    "Database stayed locked, giving up"
                );
                return Err(Error::Internal(format!(
                    "{label}: database stayed locked for {} ms over {failed} attempts",
                    waited.as_millis()
                )));
            }

            let pause = self.pause_after(failed).min(self.budget - waited);
            debug!(
                write = label,
                attempt = failed,
                pause_ms = pause.as_millis() as u64,
                "Database locked, pausing before retry"
            );
            tokio::time::sleep(pause).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn locked() -> Error {
        Error::Database(sqlx::Error::Protocol("database is locked".into()))
    }

    fn quick() -> LockRetry {
        LockRetry::new(2_000).with_pauses(Duration::from_millis(1), Duration::from_millis(4))
    }

    #[test]
    fn pauses_double_up_to_the_cap() {
        let policy = LockRetry::new(10_000);
        let pauses: Vec<u128> = (1..=9).map(|n| policy.pause_after(n).as_millis()).collect();
        assert_eq!(pauses, vec![10, 20, 40, 80, 160, 320, 640, 1000, 1000]);
        assert_eq!(policy.pause_after(200), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn clean_write_runs_once() {
        let calls = AtomicU32::new(0);
        let value = quick()
            .run("insert", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Error>("stored")
            })
            .await
            .unwrap();

        assert_eq!(value, "stored");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn locked_write_is_repeated_until_it_lands() {
        let calls = AtomicU32::new(0);
        let value = quick()
            .run("insert", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err(locked())
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn exhausted_budget_reports_attempts() {
        let policy = LockRetry::new(30).with_pauses(Duration::from_millis(5), Duration::from_millis(5));
        let err = policy
            .run("insert", || async { Err::<(), _>(locked()) })
            .await
            .unwrap_err();

        match err {
            Error::Internal(msg) => {
                assert!(msg.starts_with("insert: database stayed locked"), "{msg}");
                assert!(msg.contains("attempts"), "{msg}");
            }
            other => panic!("expected Internal, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn other_errors_skip_the_retry() {
        let calls = AtomicU32::new(0);
        let err = quick()
            .run("insert", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::Internal("constraint failed".into()))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Internal(ref msg) if msg == "constraint failed"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
