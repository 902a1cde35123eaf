//! In-flight message heartbeat.
//!
//! Long computations outlive the broker's message timeout. While a handler
//! works, a [`Heartbeat`] touches the delivery on a fixed interval so the
//! broker does not redeliver it. The returned [`HeartbeatHandle`] stops the
//! task when dropped, so the heartbeat never outlives the work it guards.

use crate::broker::{BrokerError, Delivery};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default interval between touches (30 seconds).
pub const DEFAULT_TOUCH_INTERVAL: Duration = Duration::from_secs(30);

/// Periodically touches one delivery.
pub struct Heartbeat {
    delivery: Arc<dyn Delivery>,
    interval: Duration,
}

impl Heartbeat {
    pub fn new(delivery: Arc<dyn Delivery>, interval: Duration) -> Self {
        Self { delivery, interval }
    }

    /// Touches the delivery every interval until `stop` fires or the
    /// delivery is no longer in flight. Returns the number of touches.
    pub async fn run(self, stop: CancellationToken) -> u32 {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut touches = 0u32;

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    match self.delivery.touch().await {
                        Ok(()) => {
                            touches += 1;
                            debug!(id = self.delivery.id(), touches, "Touched message");
                        }
                        Err(BrokerError::NotInFlight(_)) => {
                            warn!(id = self.delivery.id(), "Message left flight, heartbeat stopping");
                            break;
                        }
                        Err(e) => {
                            warn!(id = self.delivery.id(), error = %e, "Failed to touch message");
                        }
                    }
                }
            }
        }

        touches
    }

    /// Runs the heartbeat on its own task.
    pub fn spawn(self) -> HeartbeatHandle {
        let stop = CancellationToken::new();
        let task = tokio::spawn(self.run(stop.clone()));
        HeartbeatHandle {
            stop,
            task: Some(task),
        }
    }
}

/// Owner of a running heartbeat task.
pub struct HeartbeatHandle {
    stop: CancellationToken,
    task: Option<JoinHandle<u32>>,
}

impl HeartbeatHandle {
    /// Stops the heartbeat and waits for it. Returns the number of touches.
    pub async fn stop(mut self) -> u32 {
        self.stop.cancel();
        match self.task.take() {
            Some(task) => task.await.unwrap_or(0),
            None => 0,
        }
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
