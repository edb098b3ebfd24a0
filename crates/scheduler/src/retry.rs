//! Transient-error retry budget for model/tool calls: doubling, capped,
//! jittered backoff — 3 attempts, 1s → 10s.

use std::time::Duration;

use agentcore_core::config::DEFAULT_RETRY_ATTEMPTS;
use agentcore_core::error::{EngineError, ErrorKind};
use tracing::warn;

const BACKOFF_BASE_SECS: u64 = 1;
const BACKOFF_MAX_SECS: u64 = 10;
const JITTER_FRACTION: f64 = 0.10;

/// Returns a jitter offset in whole seconds, 0..=`JITTER_FRACTION * base_secs`.
fn jitter_secs(base_secs: u64) -> u64 {
    let nanos = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.subsec_nanos()).unwrap_or(0);
    let max_jitter = ((base_secs as f64) * JITTER_FRACTION) as u64;
    if max_jitter == 0 {
        0
    } else {
        (nanos as u64) % max_jitter
    }
}

/// Runs `op` up to `DEFAULT_RETRY_ATTEMPTS` times, retrying only when the
/// failure's `ErrorKind` is `Transient`. Any other kind is returned
/// immediately without consuming a retry.
pub async fn retry_transient<F, Fut, T>(label: &str, mut op: F) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, EngineError>>,
{
    let mut delay_secs = BACKOFF_BASE_SECS;

    for attempt in 1..=DEFAULT_RETRY_ATTEMPTS {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.kind() != ErrorKind::Transient => return Err(e),
            Err(e) if attempt == DEFAULT_RETRY_ATTEMPTS => return Err(e),
            Err(e) => {
                let jitter = jitter_secs(delay_secs);
                let total = delay_secs + jitter;
                warn!(label, attempt, max = DEFAULT_RETRY_ATTEMPTS, error = %e, retry_after_secs = total, "transient failure, retrying with backoff");
                tokio::time::sleep(Duration::from_secs(total)).await;
                delay_secs = (delay_secs * 2).min(BACKOFF_MAX_SECS);
            }
        }
    }

    unreachable!("retry loop exited without returning")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures_until_success() {
        let attempts = AtomicU32::new(0);
        let result = retry_transient("test", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(EngineError::Transient("not yet".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_failure_is_not_retried() {
        let attempts = AtomicU32::new(0);
        let result: Result<i32, EngineError> = retry_transient("test", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move { Err(EngineError::InvalidInput { message: "bad".to_string(), suggestion: None }) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausting_retry_budget_returns_last_error() {
        let attempts = AtomicU32::new(0);
        let result: Result<i32, EngineError> = retry_transient("test", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move { Err(EngineError::Transient("still failing".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), DEFAULT_RETRY_ATTEMPTS);
    }
}
