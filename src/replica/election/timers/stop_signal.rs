use tokio::sync::watch;

/// Stopper tells every paired `StopCheck` to stop, either explicitly or when dropped.
pub(crate) struct Stopper {
    stop_signal: watch::Sender<bool>,
}

#[derive(Clone)]
pub(crate) struct StopCheck {
    stop_signal: watch::Receiver<bool>,
}

impl Stopper {
    pub(crate) fn stop(&self) {
        self.stop_signal.send_replace(true);
    }
}

impl Drop for Stopper {
    fn drop(&mut self) {
        self.stop();
    }
}

impl StopCheck {
    pub(crate) fn should_stop(&self) -> bool {
        *self.stop_signal.borrow()
    }

    /// Resolves once the paired `Stopper` has stopped or dropped.
    pub(crate) async fn stopped(&mut self) {
        while !*self.stop_signal.borrow() {
            if self.stop_signal.changed().await.is_err() {
                // Sender is gone without us seeing the final value. Gone means stopped.
                return;
            }
        }
    }
}

pub(crate) fn new() -> (Stopper, StopCheck) {
    let (tx, rx) = watch::channel(false);

    (Stopper { stop_signal: tx }, StopCheck { stop_signal: rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn drop_stops() {
        let (stopper, mut check) = new();
        assert!(!check.should_stop());

        let waiter = tokio::spawn(async move {
            check.stopped().await;
            check.should_stop()
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(stopper);
        assert!(waiter.await.unwrap());
    }
}
