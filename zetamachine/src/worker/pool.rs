//! Bounded-concurrency consumer.
//!
//! A [`ConsumerPool`] pulls deliveries from one channel and runs a
//! [`MessageHandler`] for each, at most `max_in_flight` at a time. The
//! handler decides what happens to the message through a [`Disposition`];
//! the pool applies it after the handler returns.
//!
//! # Shutdown
//!
//! When the shutdown token fires the pool stops pulling, waits up to
//! `shutdown_grace` for running handlers, then cancels the job token handed
//! to every handler and waits for them to return.

use crate::broker::{BoxFuture, Broker, BrokerError, Delivery};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default grace period for in-flight handlers at shutdown.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// What to do with a message once its handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Acknowledge: handled, dropped or dead-lettered
    Finish,
    /// Put back for another attempt after the delay
    Requeue(Duration),
}

/// Per-message work run by a [`ConsumerPool`].
pub trait MessageHandler: Send + Sync + 'static {
    /// Handles one delivery. `cancel` fires when the pool gives up waiting
    /// at shutdown.
    fn handle(
        &self,
        delivery: Arc<dyn Delivery>,
        cancel: CancellationToken,
    ) -> BoxFuture<'_, Disposition>;
}

/// [`ConsumerPool`] settings.
#[derive(Debug, Clone)]
pub struct ConsumerPoolConfig {
    /// Name used in logs
    pub name: String,
    pub topic: String,
    pub channel: String,
    /// Handlers allowed to run at once
    pub max_in_flight: usize,
    pub shutdown_grace: Duration,
}

/// Counters reported when a pool stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub finished: u64,
    pub requeued: u64,
    /// Handlers that panicked; their messages time out and are redelivered
    pub failed: u64,
    /// Acknowledgements the broker rejected
    pub ack_errors: u64,
}

impl PoolStats {
    pub fn handled(&self) -> u64 {
        self.finished + self.requeued + self.failed
    }

    fn record(&mut self, outcome: Result<Outcome, JoinError>) {
        match outcome {
            Ok(outcome) => {
                match outcome.disposition {
                    Disposition::Finish => self.finished += 1,
                    Disposition::Requeue(_) => self.requeued += 1,
                }
                if !outcome.acknowledged {
                    self.ack_errors += 1;
                }
            }
            Err(e) => {
                warn!(error = %e, "Message handler panicked");
                self.failed += 1;
            }
        }
    }
}

struct Outcome {
    disposition: Disposition,
    acknowledged: bool,
}

/// Consumes one channel with a bounded number of concurrent handlers.
pub struct ConsumerPool {
    broker: Arc<dyn Broker>,
    handler: Arc<dyn MessageHandler>,
    config: ConsumerPoolConfig,
}

impl ConsumerPool {
    pub fn new(
        broker: Arc<dyn Broker>,
        handler: Arc<dyn MessageHandler>,
        config: ConsumerPoolConfig,
    ) -> Self {
        Self {
            broker,
            handler,
            config,
        }
    }

    pub fn config(&self) -> &ConsumerPoolConfig {
        &self.config
    }

    /// Runs until `shutdown` fires or the subscription ends.
    pub async fn run(self, shutdown: CancellationToken) -> Result<PoolStats, BrokerError> {
        let max_in_flight = self.config.max_in_flight.max(1);
        let mut subscription = self
            .broker
            .subscribe(&self.config.topic, &self.config.channel, max_in_flight)
            .await?;

        info!(
            pool = %self.config.name,
            topic = %self.config.topic,
            channel = %self.config.channel,
            max_in_flight,
            "Consumer pool started"
        );

        let semaphore = Arc::new(Semaphore::new(max_in_flight));
        let jobs = CancellationToken::new();
        let mut tasks: JoinSet<Outcome> = JoinSet::new();
        let mut stats = PoolStats::default();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                Some(outcome) = tasks.join_next(), if !tasks.is_empty() => stats.record(outcome),
                next = async {
                    let permit = Arc::clone(&semaphore).acquire_owned().await.ok()?;
                    let delivery = subscription.next().await?;
                    Some((permit, delivery))
                } => {
                    let Some((permit, delivery)) = next else {
                        debug!(pool = %self.config.name, "Subscription ended");
                        break;
                    };
                    let handler = Arc::clone(&self.handler);
                    let cancel = jobs.clone();
                    tasks.spawn(async move {
                        let _permit = permit;
                        let disposition = handler.handle(Arc::clone(&delivery), cancel).await;
                        let acknowledged = apply(delivery.as_ref(), disposition).await;
                        Outcome { disposition, acknowledged }
                    });
                }
            }
        }

        if !tasks.is_empty() {
            info!(
                pool = %self.config.name,
                in_flight = tasks.len(),
                grace_secs = self.config.shutdown_grace.as_secs(),
                "Waiting for in-flight messages"
            );
        }

        let drained = tokio::time::timeout(self.config.shutdown_grace, async {
            while let Some(outcome) = tasks.join_next().await {
                stats.record(outcome);
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                pool = %self.config.name,
                remaining = tasks.len(),
                "Grace period elapsed, cancelling in-flight messages"
            );
            jobs.cancel();
            while let Some(outcome) = tasks.join_next().await {
                stats.record(outcome);
            }
        }

        info!(
            pool = %self.config.name,
            finished = stats.finished,
            requeued = stats.requeued,
            failed = stats.failed,
            "Consumer pool stopped"
        );
        Ok(stats)
    }
}

/// Applies a disposition. Returns whether the broker accepted it.
async fn apply(delivery: &dyn Delivery, disposition: Disposition) -> bool {
    let result = match disposition {
        Disposition::Finish => delivery.finish().await,
        Disposition::Requeue(delay) => delivery.requeue(delay).await,
    };
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!(id = delivery.id(), ?disposition, error = %e, "Failed to acknowledge message");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{MemoryBroker, MemoryBrokerConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TOPIC: &str = "jobs";

    fn config(max_in_flight: usize, grace: Duration) -> ConsumerPoolConfig {
        ConsumerPoolConfig {
            name: "test".into(),
            topic: TOPIC.into(),
            channel: "work".into(),
            max_in_flight,
            shutdown_grace: grace,
        }
    }

    /// Sleeps, tracks peak concurrency, then finishes.
    struct Sleeper {
        running: AtomicUsize,
        peak: AtomicUsize,
        done: AtomicUsize,
    }

    impl Sleeper {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                done: AtomicUsize::new(0),
            })
        }
    }

    impl MessageHandler for Sleeper {
        fn handle(&self, _: Arc<dyn Delivery>, _: CancellationToken) -> BoxFuture<'_, Disposition> {
            Box::pin(async move {
                let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(1)).await;
                self.running.fetch_sub(1, Ordering::SeqCst);
                self.done.fetch_add(1, Ordering::SeqCst);
                Disposition::Finish
            })
        }
    }

    /// Requeues first attempts, finishes retries.
    struct RetryOnce;

    impl MessageHandler for RetryOnce {
        fn handle(&self, delivery: Arc<dyn Delivery>, _: CancellationToken) -> BoxFuture<'_, Disposition> {
            Box::pin(async move {
                if delivery.attempts() == 1 {
                    Disposition::Requeue(Duration::from_secs(5))
                } else {
                    Disposition::Finish
                }
            })
        }
    }

    /// Blocks until cancelled, then requeues.
    struct Stubborn;

    impl MessageHandler for Stubborn {
        fn handle(&self, _: Arc<dyn Delivery>, cancel: CancellationToken) -> BoxFuture<'_, Disposition> {
            Box::pin(async move {
                cancel.cancelled().await;
                Disposition::Requeue(Duration::ZERO)
            })
        }
    }

    fn memory_broker() -> MemoryBroker {
        MemoryBroker::new(MemoryBrokerConfig {
            max_message_size: 1024,
            message_timeout: Duration::from_secs(600),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_concurrency() {
        let broker = memory_broker();
        for i in 0..6u8 {
            broker.publish(TOPIC, vec![i]).await.unwrap();
        }

        let handler = Sleeper::new();
        let shutdown = CancellationToken::new();
        let pool = ConsumerPool::new(
            Arc::new(broker.clone()),
            handler.clone(),
            config(2, Duration::from_secs(10)),
        );
        let run = tokio::spawn(pool.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_secs(10)).await;
        shutdown.cancel();
        let stats = run.await.unwrap().unwrap();

        assert_eq!(handler.done.load(Ordering::SeqCst), 6);
        assert_eq!(handler.peak.load(Ordering::SeqCst), 2);
        assert_eq!(stats.finished, 6);
        assert_eq!(broker.depth(TOPIC, "work"), 0);
        assert_eq!(broker.in_flight(TOPIC, "work"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requeue_disposition() {
        let broker = memory_broker();
        broker.publish(TOPIC, b"retry".to_vec()).await.unwrap();

        let shutdown = CancellationToken::new();
        let pool = ConsumerPool::new(
            Arc::new(broker.clone()),
            Arc::new(RetryOnce),
            config(1, Duration::from_secs(1)),
        );
        let run = tokio::spawn(pool.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_secs(30)).await;
        shutdown.cancel();
        let stats = run.await.unwrap().unwrap();

        assert_eq!(stats.requeued, 1);
        assert_eq!(stats.finished, 1);
        assert_eq!(broker.depth(TOPIC, "work"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_then_cancel() {
        let broker = memory_broker();
        broker.publish(TOPIC, b"forever".to_vec()).await.unwrap();

        let shutdown = CancellationToken::new();
        let pool = ConsumerPool::new(
            Arc::new(broker.clone()),
            Arc::new(Stubborn),
            config(1, Duration::from_secs(3)),
        );
        let run = tokio::spawn(pool.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(broker.in_flight(TOPIC, "work"), 1);

        let stopped_at = tokio::time::Instant::now();
        shutdown.cancel();
        let stats = run.await.unwrap().unwrap();

        assert!(stopped_at.elapsed() >= Duration::from_secs(3));
        assert_eq!(stats.requeued, 1);
        // Back on the channel for the next consumer
        assert_eq!(broker.depth(TOPIC, "work"), 1);
        assert_eq!(broker.in_flight(TOPIC, "work"), 0);
    }

    #[tokio::test]
    async fn test_stops_when_broker_closes() {
        let broker = memory_broker();
        let pool = ConsumerPool::new(
            Arc::new(broker.clone()),
            Sleeper::new(),
            config(1, Duration::from_secs(1)),
        );
        let run = tokio::spawn(pool.run(CancellationToken::new()));

        tokio::task::yield_now().await;
        broker.close();

        let stats = run.await.unwrap().unwrap();
        assert_eq!(stats.handled(), 0);
    }
}
