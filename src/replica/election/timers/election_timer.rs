use crate::actor::WeakActorClient;
use crate::replica::election::timers::stop_signal::{self, StopCheck, Stopper};
use crate::replica::election::timers::time::{Clock, RealClock};
use rand::Rng;
use std::ops::RangeInclusive;
use tokio::time::{Duration, Instant};

/// ElectionTimer is a one-shot, re-armable timer. Each `reset()` cancels the pending firing and
/// schedules a new one at a random point in the election timeout range. Firings carry the
/// generation they were armed with so the actor can drop ones that lost a race with a reset.
pub(crate) struct ElectionTimer<C: Clock = RealClock> {
    timeout_range: RangeInclusive<Duration>,
    actor_client: WeakActorClient,
    clock: C,
    generation: u64,
    pending: Option<Stopper>,
}

struct ElectionTimeoutTask<C: Clock> {
    generation: u64,
    deadline: Instant,
    actor_client: WeakActorClient,
    clock: C,
    stop_check: StopCheck,
}

impl ElectionTimer {
    pub(crate) fn new(min_timeout: Duration, max_timeout: Duration, actor_client: WeakActorClient) -> Self {
        Self::with_clock(min_timeout, max_timeout, actor_client, RealClock)
    }
}

impl<C: Clock> ElectionTimer<C> {
    pub(crate) fn with_clock(
        min_timeout: Duration,
        max_timeout: Duration,
        actor_client: WeakActorClient,
        clock: C,
    ) -> Self {
        ElectionTimer {
            timeout_range: RangeInclusive::new(min_timeout, max_timeout),
            actor_client,
            clock,
            generation: 0,
            pending: None,
        }
    }

    /// Cancel any pending firing and arm a fresh one. Returns the new generation.
    pub(crate) fn reset(&mut self) -> u64 {
        self.cancel();
        self.generation += 1;

        let timeout = rand::thread_rng().gen_range(self.timeout_range.clone());
        let (stopper, stop_check) = stop_signal::new();
        let task = ElectionTimeoutTask {
            generation: self.generation,
            deadline: self.clock.now() + timeout,
            actor_client: self.actor_client.clone(),
            clock: self.clock.clone(),
            stop_check,
        };
        tokio::task::spawn(task.run());
        self.pending.replace(stopper);

        self.generation
    }

    pub(crate) fn cancel(&mut self) {
        // Dropping the stopper wakes the task, which then exits without firing.
        self.pending.take();
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    /// Consume a firing. Returns true only for the firing of the currently armed generation.
    pub(crate) fn take_fired(&mut self, generation: u64) -> bool {
        if self.pending.is_some() && generation == self.generation {
            self.pending = None;
            true
        } else {
            false
        }
    }
}

impl<C: Clock> ElectionTimeoutTask<C> {
    async fn run(mut self) {
        tokio::select! {
            _ = self.clock.sleep_until(self.deadline) => {}
            _ = self.stop_check.stopped() => return,
        }

        if self.stop_check.should_stop() {
            return;
        }

        // Actor may have exited in the meantime. Nothing left to notify then.
        let _ = self.actor_client.election_timeout(self.generation).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorClient;
    use crate::replica::election::timers::test_utils::TestUtilActor;
    use crate::replica::election::timers::time::mocked_clock;

    #[tokio::test]
    async fn fires_once_at_deadline() {
        let timeout = Duration::from_millis(100);
        let (strong_client, rx) = ActorClient::new(10);
        let mut actor = TestUtilActor::new(rx);
        let (clock, mut controller) = mocked_clock();

        // Min and max are the same so the deadline is deterministic.
        let mut timer = ElectionTimer::with_clock(timeout, timeout, strong_client.weak(), clock);
        let generation = timer.reset();
        assert!(timer.is_armed());
        actor.assert_no_event().await;

        controller.advance(timeout - Duration::from_nanos(1));
        actor.assert_no_event().await;

        controller.advance(Duration::from_nanos(1));
        actor.assert_election_timeout_event(generation).await;
        assert!(timer.take_fired(generation));
        assert!(!timer.is_armed());

        controller.advance(timeout * 3);
        actor.assert_no_event().await;
    }

    #[tokio::test]
    async fn reset_supersedes_pending_firing() {
        let timeout = Duration::from_millis(100);
        let (strong_client, rx) = ActorClient::new(10);
        let mut actor = TestUtilActor::new(rx);
        let (clock, mut controller) = mocked_clock();

        let mut timer = ElectionTimer::with_clock(timeout, timeout, strong_client.weak(), clock);
        let first = timer.reset();
        for _ in 0..5 {
            controller.advance(timeout / 2);
            timer.reset();
        }
        actor.assert_no_event().await;
        assert_eq!(timeout * 5 / 2, controller.elapsed_time());

        let latest = timer.reset();
        assert!(!timer.take_fired(first));

        controller.advance(timeout);
        actor.assert_election_timeout_event(latest).await;
        actor.assert_no_event().await;
    }

    #[tokio::test]
    async fn cancel_prevents_firing() {
        let timeout = Duration::from_millis(100);
        let (strong_client, rx) = ActorClient::new(10);
        let mut actor = TestUtilActor::new(rx);
        let (clock, mut controller) = mocked_clock();

        let mut timer = ElectionTimer::with_clock(timeout, timeout, strong_client.weak(), clock);
        let generation = timer.reset();
        timer.cancel();
        assert!(!timer.is_armed());

        controller.advance(timeout * 2);
        actor.assert_no_event().await;
        assert!(!timer.take_fired(generation));
    }
}
