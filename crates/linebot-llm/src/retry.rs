use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::{LlmError, Result};

/// Exponential backoff with full jitter: `base * 2^attempt`, capped at 8s,
/// then a uniform random draw in `[0, cap]`. Matches the §4.6 retry
/// contract ("exponential backoff with jitter").
fn backoff_delay(attempt: u32, base_ms: u64) -> Duration {
    let cap_ms = 8_000u64;
    let exp = base_ms.saturating_mul(1u64 << attempt.min(16)).min(cap_ms);
    let jittered = rand::thread_rng().gen_range(0..=exp.max(1));
    Duration::from_millis(jittered)
}

/// Retry `f` up to `max_attempts` times for the retryable error set in
/// §4.6 (rate-limited, connection error, timeout, 5xx). Non-retryable
/// errors (parse failures, 4xx, unknown provider) return immediately.
pub async fn with_retry<F, Fut>(max_attempts: u32, retry_base_ms: u64, mut f: F) -> Result<crate::provider::ChatResponse>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<crate::provider::ChatResponse>>,
{
    let mut last_err: Option<LlmError> = None;
    for attempt in 0..max_attempts.max(1) {
        match f().await {
            Ok(resp) => return Ok(resp),
            Err(e) if e.retryable() && attempt + 1 < max_attempts => {
                let delay = match &e {
                    LlmError::RateLimited {
                        retry_after_ms: Some(ms),
                    } => Duration::from_millis(*ms),
                    _ => backoff_delay(attempt, retry_base_ms),
                };
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying LLM call");
                tokio::time::sleep(delay).await;
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or(LlmError::Transport("exhausted retries".into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry(3, 1, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(LlmError::ServerError { status: 503 })
                } else {
                    Ok(crate::provider::ChatResponse {
                        text: "ok".to_string(),
                    })
                }
            }
        })
        .await;
        assert_eq!(result.unwrap().text, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_retryable_errors() {
        let calls = AtomicU32::new(0);
        let result = with_retry(3, 1, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                Err(LlmError::ClientError {
                    status: 400,
                    message: "bad request".to_string(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result = with_retry(2, 1, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(LlmError::Timeout { ms: 1 }) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
