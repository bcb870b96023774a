#[cfg(test)]
use tokio::sync::watch;
#[cfg(test)]
use tokio::time::Duration;
use tokio::time::Instant;

/// Clock is the time source for election timeouts. Tests swap in `MockClock` so they can step
/// time forward by hand.
#[async_trait::async_trait]
pub(crate) trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;
    async fn sleep_until(&mut self, deadline: Instant);
}

#[derive(Copy, Clone)]
pub(crate) struct RealClock;

#[async_trait::async_trait]
impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&mut self, deadline: Instant) {
        tokio::time::sleep_until(deadline).await;
    }
}

#[cfg(test)]
pub(crate) fn mocked_clock() -> (MockClock, MockClockController) {
    let now = Instant::now();
    let (tx, rx) = watch::channel(now);

    (
        MockClock { current_time: rx },
        MockClockController {
            current_time: tx,
            started_at: now,
        },
    )
}

#[cfg(test)]
#[derive(Clone)]
pub(crate) struct MockClock {
    current_time: watch::Receiver<Instant>,
}

#[cfg(test)]
#[async_trait::async_trait]
impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.current_time.borrow()
    }

    async fn sleep_until(&mut self, deadline: Instant) {
        while *self.current_time.borrow() < deadline {
            if self.current_time.changed().await.is_err() {
                // Controller is gone, so time will never move again.
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
pub(crate) struct MockClockController {
    current_time: watch::Sender<Instant>,
    started_at: Instant,
}

#[cfg(test)]
impl MockClockController {
    pub(crate) fn elapsed_time(&self) -> Duration {
        *self.current_time.borrow() - self.started_at
    }

    /// Move mock time forward. Sleepers wake once `now` is at or past their deadline, so step in
    /// increments smaller than the precision the test cares about.
    pub(crate) fn advance(&mut self, duration: Duration) {
        let new_now = *self.current_time.borrow() + duration;
        self.current_time.send_replace(new_now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_sleep_wakes_exactly_at_deadline() {
        let (mut clock, mut controller) = mocked_clock();
        let deadline = clock.now() + Duration::from_secs(3);

        let sleeper = tokio::spawn(async move {
            clock.sleep_until(deadline).await;
            clock.now()
        });

        controller.advance(Duration::from_secs(2));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!sleeper.is_finished());

        controller.advance(Duration::from_secs(1));
        assert_eq!(deadline, sleeper.await.unwrap());
        assert_eq!(Duration::from_secs(3), controller.elapsed_time());
    }
}
