use rand::Rng;
use tokio::time::Duration;

/// Exponential backoff. Each delay gets up to 10% random jitter on top, then the base doubles
/// until it hits the cap.
#[derive(Clone, Debug)]
pub(crate) struct Backoff {
    current: Duration,
    max_delay: Duration,
}

impl Backoff {
    pub(crate) fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Backoff {
            current: base_delay.min(max_delay),
            max_delay,
        }
    }

    pub(crate) fn next_delay(&mut self) -> Duration {
        let jitter = self.current.mul_f64(rand::thread_rng().gen_range(0.0..=0.1));
        let delay = self.current + jitter;
        self.current = (self.current * 2).min(self.max_delay);

        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_within_jitter(base_ms: u64, actual: Duration) {
        let base = Duration::from_millis(base_ms);
        assert!(actual >= base, "{:?} < {:?}", actual, base);
        assert!(actual <= base.mul_f64(1.1), "{:?} > {:?} + 10%", actual, base);
    }

    #[test]
    fn doubles_up_to_cap() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(500));

        assert_within_jitter(100, backoff.next_delay());
        assert_within_jitter(200, backoff.next_delay());
        assert_within_jitter(400, backoff.next_delay());
        assert_within_jitter(500, backoff.next_delay());
        assert_within_jitter(500, backoff.next_delay());
    }
}
