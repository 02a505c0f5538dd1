use std::time::Duration;
use tokio::select;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Drives a polling loop. The first tick fires immediately; later ticks wait
/// `interval` after the previous one. A zero interval yields to the runtime
/// instead of sleeping.
pub struct Ticker {
    interval: Duration,
    cancel: CancellationToken,
    started: bool,
}

impl Ticker {
    pub fn new(interval: Duration, cancel: CancellationToken) -> Self {
        Self {
            interval,
            cancel,
            started: false,
        }
    }

    /// Wait for the next tick. Returns `false` once cancelled; a cycle that is
    /// already running is never interrupted.
    pub async fn tick(&mut self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }

        if !self.started {
            self.started = true;
            return true;
        }

        if self.interval.is_zero() {
            tokio::task::yield_now().await;
            return !self.cancel.is_cancelled();
        }

        select! {
            _ = sleep(self.interval) => !self.cancel.is_cancelled(),
            _ = self.cancel.cancelled() => false,
        }
    }
}
