use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Process-wide breaker over the LLM client (§5 "shared-resource policy":
/// mutated only by the client's own methods). After `threshold` consecutive
/// failures the breaker opens for `cooldown_secs`; while open, calls fail
/// fast with `LlmError::CircuitOpen` without ever reaching the network.
pub struct CircuitBreaker {
    threshold: u32,
    cooldown_secs: u64,
    consecutive_failures: AtomicU32,
    /// Unix timestamp (seconds) the breaker opened at; 0 means closed.
    opened_at: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown_secs: u64) -> Self {
        Self {
            threshold,
            cooldown_secs,
            consecutive_failures: AtomicU32::new(0),
            opened_at: AtomicU64::new(0),
        }
    }

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }

    /// True while the breaker is open and the cooldown hasn't elapsed yet.
    /// Once the cooldown elapses the breaker lets one probe call through
    /// (half-open) without resetting `opened_at` itself — a subsequent
    /// `record_success`/`record_failure` call does that.
    pub fn is_open(&self) -> bool {
        let opened_at = self.opened_at.load(Ordering::Acquire);
        if opened_at == 0 {
            return false;
        }
        Self::now().saturating_sub(opened_at) < self.cooldown_secs
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        self.opened_at.store(0, Ordering::Release);
    }

    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= self.threshold {
            self.opened_at.store(Self::now(), Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_until_threshold_reached() {
        let breaker = CircuitBreaker::new(3, 30);
        breaker.record_failure();
        breaker.record_failure();
        assert!(!breaker.is_open());
        breaker.record_failure();
        assert!(breaker.is_open());
    }

    #[test]
    fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new(2, 30);
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert!(!breaker.is_open());
    }

    #[test]
    fn cooldown_of_zero_closes_immediately() {
        let breaker = CircuitBreaker::new(1, 0);
        breaker.record_failure();
        assert!(!breaker.is_open());
    }
}
