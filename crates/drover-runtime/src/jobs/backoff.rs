use std::time::Duration;

use rand::Rng;

/// Idle/error backoff for polling loops: doubles up to a cap, with jitter.
#[derive(Debug, Clone)]
pub struct PollBackoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl PollBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let base = base.max(Duration::from_millis(1));
        Self {
            base,
            max: max.max(base),
            current: base,
        }
    }

    /// Next sleep: the current step plus up to 25% jitter, capped at `max`.
    pub fn next_delay(&mut self) -> Duration {
        let step = self.current;
        self.current = (self.current * 2).min(self.max);

        let jitter_ms = (step.as_millis() as u64 / 4).max(1);
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms));
        (step + jitter).min(self.max)
    }

    /// Back to the base interval after useful work.
    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let mut backoff = PollBackoff::new(Duration::from_millis(100), Duration::from_millis(500));

        let first = backoff.next_delay();
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(125));

        let second = backoff.next_delay();
        assert!(second >= Duration::from_millis(200) && second <= Duration::from_millis(250));

        for _ in 0..10 {
            assert!(backoff.next_delay() <= Duration::from_millis(500));
        }
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = PollBackoff::new(Duration::from_millis(10), Duration::from_secs(1));
        for _ in 0..5 {
            backoff.next_delay();
        }

        backoff.reset();
        assert!(backoff.next_delay() <= Duration::from_millis(13));
    }

    #[test]
    fn test_zero_base_is_clamped() {
        let mut backoff = PollBackoff::new(Duration::ZERO, Duration::ZERO);
        assert!(backoff.next_delay() >= Duration::from_millis(1));
    }
}
