//! Retry/backoff policy shared by both transports.

use std::time::Duration;

use rand::{thread_rng, Rng};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub cap: Duration,
    /// Retries allowed after a failure before the client gives up.
    pub max_attempts: u32,
    /// Upper bound of the uniform jitter added to each delay (0 = none).
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            cap: Duration::from_millis(30_000),
            max_attempts: 5,
            jitter_ms: 0,
        }
    }
}

impl RetryPolicy {
    /// `base * 2^(attempt-1)`, capped, plus jitter. `attempt` is 1-based.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(30);
        let base_ms = self.base.as_millis() as u64;
        let raw = base_ms.saturating_mul(1u64 << exp);
        let capped = raw.min(self.cap.as_millis() as u64);
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            thread_rng().gen_range(0..=self.jitter_ms)
        };
        Duration::from_millis(capped + jitter)
    }

    /// True once `attempt` failures have used up the retry budget.
    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt > self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(cap_ms: u64) -> RetryPolicy {
        RetryPolicy {
            base: Duration::from_millis(1000),
            cap: Duration::from_millis(cap_ms),
            max_attempts: 3,
            jitter_ms: 0,
        }
    }

    #[test]
    fn doubles_from_base() {
        let p = policy(30_000);
        let delays: Vec<u64> = (1..=3).map(|a| p.delay(a).as_millis() as u64).collect();
        assert_eq!(delays, vec![1000, 2000, 4000]);
    }

    #[test]
    fn respects_cap() {
        let p = policy(3000);
        assert_eq!(p.delay(3), Duration::from_millis(3000));
        assert_eq!(p.delay(40), Duration::from_millis(3000));
    }

    #[test]
    fn jitter_stays_in_bounds() {
        let p = RetryPolicy {
            jitter_ms: 250,
            ..policy(30_000)
        };
        for _ in 0..50 {
            let d = p.delay(2).as_millis() as u64;
            assert!((2000..=2250).contains(&d), "delay {d} out of range");
        }
    }

    #[test]
    fn budget() {
        let p = policy(30_000);
        assert!(!p.exhausted(3));
        assert!(p.exhausted(4));
    }
}
