use crate::actor::Event;
use std::time::Duration;
use tokio::sync::mpsc;

/// TestUtilActor stands in for the replica actor and lets timer tests assert on what the timer
/// sent to the actor queue.
pub(super) struct TestUtilActor {
    rx: mpsc::Receiver<Event>,
    quiet_period: Duration,
}

impl TestUtilActor {
    pub(super) fn new(rx: mpsc::Receiver<Event>) -> Self {
        TestUtilActor {
            rx,
            quiet_period: Duration::from_millis(10),
        }
    }

    pub(super) async fn assert_election_timeout_event(&mut self, expected_generation: u64) {
        let event = tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("Unexpected timeout")
            .expect("Actor queue closed");

        match event {
            Event::ElectionTimeout(generation) => assert_eq!(expected_generation, generation),
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    pub(super) async fn assert_no_event(&mut self) {
        if let Ok(event) = tokio::time::timeout(self.quiet_period, self.rx.recv()).await {
            panic!("Expected no event, got: {:?}", event);
        }
    }
}
