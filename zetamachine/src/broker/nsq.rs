//! NSQ transport.
//!
//! Publishes through a single `nsqd` and consumes through `nsqlookupd`
//! discovery, so generate and store workers can run on separate machines.

use super::{validate_name, BoxFuture, Broker, BrokerError, Delivery, Subscription};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_nsq::{
    NSQChannel, NSQConsumer, NSQConsumerConfig, NSQConsumerConfigSources,
    NSQConsumerLookupConfig, NSQEvent, NSQMessage, NSQProducer, NSQProducerConfig,
    NSQRequeueDelay, NSQTopic,
};
use tracing::{debug, info, warn};

/// NSQ connection settings.
#[derive(Debug, Clone)]
pub struct NsqConfig {
    /// `host:port` of the nsqd that receives publishes
    pub nsqd: String,
    /// `host:port` of nsqlookupd used for consumer discovery
    pub lookupd: String,
    /// Largest body `publish` accepts
    pub max_message_size: usize,
}

/// Broker backed by NSQ daemons.
pub struct NsqBroker {
    config: NsqConfig,
    producer: Mutex<Option<NSQProducer>>,
}

static NEXT_DELIVERY: AtomicU64 = AtomicU64::new(1);

impl NsqBroker {
    pub fn new(config: NsqConfig) -> Self {
        info!(nsqd = %config.nsqd, lookupd = %config.lookupd, "Using NSQ transport");
        Self {
            config,
            producer: Mutex::new(None),
        }
    }

    fn topic(name: &str) -> Result<Arc<NSQTopic>, BrokerError> {
        validate_name(name)?;
        NSQTopic::new(name).ok_or_else(|| BrokerError::InvalidName(name.to_string()))
    }

    fn lookup_address(&self) -> String {
        if self.config.lookupd.starts_with("http://") || self.config.lookupd.starts_with("https://") {
            self.config.lookupd.clone()
        } else {
            format!("http://{}", self.config.lookupd)
        }
    }

    async fn publish_inner(&self, topic: &str, body: Vec<u8>) -> Result<(), BrokerError> {
        let max = self.config.max_message_size;
        if body.len() > max {
            return Err(BrokerError::MessageTooLarge {
                size: body.len(),
                max,
            });
        }
        let topic = Self::topic(topic)?;

        let mut guard = self.producer.lock().await;
        if guard.is_none() {
            let mut producer = NSQProducerConfig::new(self.config.nsqd.clone()).build();
            wait_for(&mut producer, |event| matches!(event, NSQEvent::Healthy())).await?;
            debug!(nsqd = %self.config.nsqd, "NSQ producer connected");
            *guard = Some(producer);
        }
        let producer = guard
            .as_mut()
            .ok_or_else(|| BrokerError::Transport("producer unavailable".into()))?;

        let published = producer.publish(&topic, body).await;
        let acknowledged = match published {
            Ok(()) => wait_for(producer, |event| matches!(event, NSQEvent::Ok())).await,
            Err(e) => Err(BrokerError::Transport(e.to_string())),
        };

        if acknowledged.is_err() {
            // Reconnect on the next publish
            *guard = None;
        }
        acknowledged
    }
}

/// Drains producer events until `done` matches one.
async fn wait_for(
    producer: &mut NSQProducer,
    done: impl Fn(&NSQEvent) -> bool,
) -> Result<(), BrokerError> {
    loop {
        match producer.consume().await {
            Some(event) if done(&event) => return Ok(()),
            Some(NSQEvent::Unhealthy()) => {
                return Err(BrokerError::Transport("nsqd connection unhealthy".into()))
            }
            Some(_) => continue,
            None => return Err(BrokerError::Transport("nsqd producer stopped".into())),
        }
    }
}

impl Broker for NsqBroker {
    fn publish(&self, topic: &str, body: Vec<u8>) -> BoxFuture<'_, Result<(), BrokerError>> {
        let topic = topic.to_string();
        Box::pin(async move { self.publish_inner(&topic, body).await })
    }

    fn subscribe(
        &self,
        topic: &str,
        channel: &str,
        max_in_flight: usize,
    ) -> BoxFuture<'_, Result<Box<dyn Subscription>, BrokerError>> {
        let topic = topic.to_string();
        let channel = channel.to_string();
        Box::pin(async move {
            let nsq_topic = Self::topic(&topic)?;
            validate_name(&channel)?;
            let nsq_channel = NSQChannel::new(channel.as_str())
                .ok_or_else(|| BrokerError::InvalidName(channel.clone()))?;

            let mut addresses = HashSet::new();
            addresses.insert(self.lookup_address());

            let consumer = NSQConsumerConfig::new(nsq_topic, nsq_channel)
                .set_max_in_flight(max_in_flight.max(1) as u32)
                .set_sources(NSQConsumerConfigSources::Lookup(
                    NSQConsumerLookupConfig::new().set_addresses(addresses),
                ))
                .build();

            info!(topic = %topic, channel = %channel, max_in_flight, "Subscribed to NSQ");
            Ok(Box::new(NsqSubscription { consumer }) as Box<dyn Subscription>)
        })
    }

    fn max_message_size(&self) -> usize {
        self.config.max_message_size
    }
}

struct NsqSubscription {
    consumer: NSQConsumer,
}

impl Subscription for NsqSubscription {
    fn next(&mut self) -> BoxFuture<'_, Option<Arc<dyn Delivery>>> {
        Box::pin(async move {
            let message = self.consumer.consume_filtered().await?;
            let id = format!("{:016x}", NEXT_DELIVERY.fetch_add(1, Ordering::Relaxed));
            Some(Arc::new(NsqDelivery {
                id,
                body: message.body.clone(),
                attempts: message.attempt,
                message: Mutex::new(Some(message)),
            }) as Arc<dyn Delivery>)
        })
    }
}

struct NsqDelivery {
    id: String,
    body: Vec<u8>,
    attempts: u16,
    message: Mutex<Option<NSQMessage>>,
}

impl NsqDelivery {
    fn gone(&self) -> BrokerError {
        BrokerError::NotInFlight(self.id.clone())
    }
}

impl Delivery for NsqDelivery {
    fn id(&self) -> &str {
        &self.id
    }

    fn body(&self) -> &[u8] {
        &self.body
    }

    fn attempts(&self) -> u16 {
        self.attempts
    }

    fn touch(&self) -> BoxFuture<'_, Result<(), BrokerError>> {
        Box::pin(async move {
            let mut guard = self.message.lock().await;
            let message = guard.as_mut().ok_or_else(|| self.gone())?;
            message.touch().await;
            Ok(())
        })
    }

    fn finish(&self) -> BoxFuture<'_, Result<(), BrokerError>> {
        Box::pin(async move {
            let message = self.message.lock().await.take().ok_or_else(|| self.gone())?;
            message.finish().await;
            Ok(())
        })
    }

    fn requeue(&self, delay: Duration) -> BoxFuture<'_, Result<(), BrokerError>> {
        Box::pin(async move {
            let message = self.message.lock().await.take().ok_or_else(|| self.gone())?;
            let delay = if delay.is_zero() {
                NSQRequeueDelay::NoDelay
            } else {
                NSQRequeueDelay::CustomDelay(delay)
            };
            message.requeue(delay).await;
            Ok(())
        })
    }
}

impl Drop for NsqDelivery {
    fn drop(&mut self) {
        if self.message.get_mut().is_some() {
            warn!(id = %self.id, "NSQ message dropped without acknowledgement");
        }
    }
}
