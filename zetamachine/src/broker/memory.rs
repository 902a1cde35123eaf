//! In-process broker with NSQ delivery semantics.

use super::{
    validate_name, BoxFuture, Broker, BrokerError, Delivery, Subscription,
    DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_MESSAGE_TIMEOUT,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::future::ready;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};

/// [`MemoryBroker`] settings.
#[derive(Debug, Clone)]
pub struct MemoryBrokerConfig {
    /// Largest body accepted by `publish`
    pub max_message_size: usize,
    /// In-flight time before an untouched delivery is redelivered
    pub message_timeout: Duration,
}

impl Default for MemoryBrokerConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            message_timeout: DEFAULT_MESSAGE_TIMEOUT,
        }
    }
}

/// In-process broker.
///
/// Messages published to a topic with no channels are held on the topic and
/// handed to the first channel that subscribes. Cloning shares the broker.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

struct Inner {
    config: MemoryBrokerConfig,
    topics: Mutex<HashMap<String, Topic>>,
    closed: AtomicBool,
    next_id: AtomicU64,
}

#[derive(Default)]
struct Topic {
    channels: HashMap<String, Arc<Channel>>,
    backlog: Vec<Message>,
}

#[derive(Clone)]
struct Message {
    id: u64,
    body: Arc<[u8]>,
    attempts: u16,
}

struct Channel {
    state: Mutex<ChannelState>,
    notify: Notify,
    timeout: Duration,
}

#[derive(Default)]
struct ChannelState {
    ready: VecDeque<Message>,
    deferred: Vec<(Instant, Message)>,
    in_flight: HashMap<u64, InFlight>,
    next_delivery: u64,
}

struct InFlight {
    message: Message,
    delivery: u64,
    deadline: Instant,
    slots: Arc<AtomicUsize>,
}

impl Channel {
    fn new(timeout: Duration) -> Self {
        Self {
            state: Mutex::new(ChannelState::default()),
            notify: Notify::new(),
            timeout,
        }
    }

    fn push(&self, message: Message) {
        self.state.lock().ready.push_back(message);
        self.notify.notify_waiters();
    }

    /// Removes an in-flight delivery if it is still the current one.
    fn take_in_flight(&self, state: &mut ChannelState, id: u64, delivery: u64) -> Option<Message> {
        match state.in_flight.get(&id) {
            Some(entry) if entry.delivery == delivery => {}
            _ => return None,
        }
        let entry = state.in_flight.remove(&id)?;
        entry.slots.fetch_sub(1, Ordering::AcqRel);
        Some(entry.message)
    }
}

impl ChannelState {
    /// Redelivers expired messages and releases matured deferrals.
    ///
    /// Returns the next instant at which this needs to run again.
    fn maintain(&mut self, now: Instant) -> Option<Instant> {
        let expired: Vec<u64> = self
            .in_flight
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            if let Some(entry) = self.in_flight.remove(&id) {
                entry.slots.fetch_sub(1, Ordering::AcqRel);
                trace!(id, attempts = entry.message.attempts, "Delivery timed out");
                self.ready.push_back(entry.message);
            }
        }

        let mut index = 0;
        while index < self.deferred.len() {
            if self.deferred[index].0 <= now {
                let (_, message) = self.deferred.swap_remove(index);
                self.ready.push_back(message);
            } else {
                index += 1;
            }
        }

        self.in_flight
            .values()
            .map(|entry| entry.deadline)
            .chain(self.deferred.iter().map(|(at, _)| *at))
            .min()
    }
}

impl MemoryBroker {
    pub fn new(config: MemoryBrokerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                topics: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &MemoryBrokerConfig {
        &self.inner.config
    }

    /// Closes the broker: publishes fail and subscriptions end.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let topics = self.inner.topics.lock();
        for topic in topics.values() {
            for channel in topic.channels.values() {
                channel.notify.notify_waiters();
            }
        }
        debug!("Memory broker closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Messages waiting on a channel, including deferred requeues.
    pub fn depth(&self, topic: &str, channel: &str) -> usize {
        self.with_channel(topic, channel, |state| {
            state.ready.len() + state.deferred.len()
        })
    }

    /// Messages currently delivered and unacknowledged on a channel.
    pub fn in_flight(&self, topic: &str, channel: &str) -> usize {
        self.with_channel(topic, channel, |state| state.in_flight.len())
    }

    /// Messages held on a topic that has no channels yet.
    pub fn backlog(&self, topic: &str) -> usize {
        self.inner
            .topics
            .lock()
            .get(topic)
            .map(|t| t.backlog.len())
            .unwrap_or(0)
    }

    /// Names of the channels subscribed to a topic, sorted.
    pub fn channels(&self, topic: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .topics
            .lock()
            .get(topic)
            .map(|t| t.channels.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    fn with_channel(&self, topic: &str, channel: &str, f: impl FnOnce(&ChannelState) -> usize) -> usize {
        let channel = self
            .inner
            .topics
            .lock()
            .get(topic)
            .and_then(|t| t.channels.get(channel).cloned());
        match channel {
            Some(channel) => f(&channel.state.lock()),
            None => 0,
        }
    }

    fn publish_now(&self, topic: &str, body: Vec<u8>) -> Result<(), BrokerError> {
        validate_name(topic)?;
        if self.is_closed() {
            return Err(BrokerError::Closed);
        }
        let max = self.inner.config.max_message_size;
        if body.len() > max {
            return Err(BrokerError::MessageTooLarge {
                size: body.len(),
                max,
            });
        }

        let message = Message {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            body: body.into(),
            attempts: 0,
        };

        let channels: Vec<Arc<Channel>> = {
            let mut topics = self.inner.topics.lock();
            let entry = topics.entry(topic.to_string()).or_default();
            if entry.channels.is_empty() {
                entry.backlog.push(message);
                return Ok(());
            }
            entry.channels.values().cloned().collect()
        };

        for channel in channels {
            channel.push(message.clone());
        }
        Ok(())
    }

    fn subscribe_now(
        &self,
        topic: &str,
        channel: &str,
        max_in_flight: usize,
    ) -> Result<Box<dyn Subscription>, BrokerError> {
        validate_name(topic)?;
        validate_name(channel)?;
        if self.is_closed() {
            return Err(BrokerError::Closed);
        }

        let channel = {
            let mut topics = self.inner.topics.lock();
            let entry = topics.entry(topic.to_string()).or_default();
            let first = entry.channels.is_empty();
            let timeout = self.inner.config.message_timeout;
            let channel_state = entry
                .channels
                .entry(channel.to_string())
                .or_insert_with(|| Arc::new(Channel::new(timeout)))
                .clone();
            if first && !entry.backlog.is_empty() {
                let backlog = std::mem::take(&mut entry.backlog);
                channel_state.state.lock().ready.extend(backlog);
            }
            channel_state
        };

        debug!(topic, max_in_flight, "Subscribed to memory broker");

        Ok(Box::new(MemorySubscription {
            broker: Arc::clone(&self.inner),
            channel,
            slots: Arc::new(AtomicUsize::new(0)),
            max_in_flight: max_in_flight.max(1),
        }))
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(MemoryBrokerConfig::default())
    }
}

impl Broker for MemoryBroker {
    fn publish(&self, topic: &str, body: Vec<u8>) -> BoxFuture<'_, Result<(), BrokerError>> {
        Box::pin(ready(self.publish_now(topic, body)))
    }

    fn subscribe(
        &self,
        topic: &str,
        channel: &str,
        max_in_flight: usize,
    ) -> BoxFuture<'_, Result<Box<dyn Subscription>, BrokerError>> {
        Box::pin(ready(self.subscribe_now(topic, channel, max_in_flight)))
    }

    fn max_message_size(&self) -> usize {
        self.inner.config.max_message_size
    }
}

struct MemorySubscription {
    broker: Arc<Inner>,
    channel: Arc<Channel>,
    slots: Arc<AtomicUsize>,
    max_in_flight: usize,
}

impl MemorySubscription {
    /// Takes the next ready message, or reports when to look again.
    fn try_take(&self) -> Result<MemoryDelivery, Option<Instant>> {
        let mut state = self.channel.state.lock();
        let now = Instant::now();
        let wake_at = state.maintain(now);

        if self.slots.load(Ordering::Acquire) >= self.max_in_flight {
            return Err(wake_at);
        }
        let Some(mut message) = state.ready.pop_front() else {
            return Err(wake_at);
        };

        message.attempts = message.attempts.saturating_add(1);
        state.next_delivery += 1;
        let delivery = state.next_delivery;
        state.in_flight.insert(
            message.id,
            InFlight {
                message: message.clone(),
                delivery,
                deadline: now + self.channel.timeout,
                slots: Arc::clone(&self.slots),
            },
        );
        self.slots.fetch_add(1, Ordering::AcqRel);

        Ok(MemoryDelivery {
            channel: Arc::clone(&self.channel),
            id: message.id,
            id_text: format!("{:016x}", message.id),
            delivery,
            body: message.body,
            attempts: message.attempts,
        })
    }
}

impl Subscription for MemorySubscription {
    fn next(&mut self) -> BoxFuture<'_, Option<Arc<dyn Delivery>>> {
        Box::pin(async move {
            loop {
                let notified = self.channel.notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if self.broker.closed.load(Ordering::Acquire) {
                    return None;
                }

                match self.try_take() {
                    Ok(delivery) => return Some(Arc::new(delivery) as Arc<dyn Delivery>),
                    Err(Some(wake_at)) => {
                        tokio::select! {
                            _ = &mut notified => {}
                            _ = sleep_until(wake_at) => {}
                        }
                    }
                    Err(None) => notified.await,
                }
            }
        })
    }
}

struct MemoryDelivery {
    channel: Arc<Channel>,
    id: u64,
    id_text: String,
    delivery: u64,
    body: Arc<[u8]>,
    attempts: u16,
}

impl MemoryDelivery {
    fn not_in_flight(&self) -> BrokerError {
        BrokerError::NotInFlight(self.id_text.clone())
    }

    fn touch_now(&self) -> Result<(), BrokerError> {
        let result = {
            let mut state = self.channel.state.lock();
            let now = Instant::now();
            state.maintain(now);
            match state.in_flight.get_mut(&self.id) {
                Some(entry) if entry.delivery == self.delivery => {
                    entry.deadline = now + self.channel.timeout;
                    Ok(())
                }
                _ => Err(self.not_in_flight()),
            }
        };
        if result.is_err() {
            self.channel.notify.notify_waiters();
        }
        result
    }

    fn finish_now(&self) -> Result<(), BrokerError> {
        let removed = {
            let mut state = self.channel.state.lock();
            state.maintain(Instant::now());
            self.channel.take_in_flight(&mut state, self.id, self.delivery)
        };
        self.channel.notify.notify_waiters();
        removed.map(|_| ()).ok_or_else(|| self.not_in_flight())
    }

    fn requeue_now(&self, delay: Duration) -> Result<(), BrokerError> {
        let result = {
            let mut state = self.channel.state.lock();
            let now = Instant::now();
            state.maintain(now);
            match self.channel.take_in_flight(&mut state, self.id, self.delivery) {
                Some(message) if delay.is_zero() => {
                    state.ready.push_back(message);
                    Ok(())
                }
                Some(message) => {
                    state.deferred.push((now + delay, message));
                    Ok(())
                }
                None => Err(self.not_in_flight()),
            }
        };
        self.channel.notify.notify_waiters();
        result
    }
}

impl Delivery for MemoryDelivery {
    fn id(&self) -> &str {
        &self.id_text
    }

    fn body(&self) -> &[u8] {
        &self.body
    }

    fn attempts(&self) -> u16 {
        self.attempts
    }

    fn touch(&self) -> BoxFuture<'_, Result<(), BrokerError>> {
        Box::pin(ready(self.touch_now()))
    }

    fn finish(&self) -> BoxFuture<'_, Result<(), BrokerError>> {
        Box::pin(ready(self.finish_now()))
    }

    fn requeue(&self, delay: Duration) -> BoxFuture<'_, Result<(), BrokerError>> {
        Box::pin(ready(self.requeue_now(delay)))
    }
}
