//! Message broker abstraction.
//!
//! The roles talk to an at-least-once pub/sub broker with NSQ semantics:
//! every channel of a topic receives its own copy of each message, a
//! delivered message stays in flight until it is finished or requeued, and
//! a delivery that is not touched within the message timeout is redelivered.
//!
//! ```text
//!   publish(topic) ──► topic ──► channel "generate" ──► Subscription::next()
//!                           └──► channel "audit"    ──► ...
//!                                      │
//!                      Delivery::{touch, finish, requeue}
//! ```
//!
//! Two transports implement the traits: [`MemoryBroker`], an in-process
//! broker used by the single-process `seed` mode and by tests, and the
//! NSQ client behind the `nsq` cargo feature.

mod memory;
#[cfg(feature = "nsq")]
mod nsq;

pub use memory::{MemoryBroker, MemoryBrokerConfig};
#[cfg(feature = "nsq")]
pub use nsq::{NsqBroker, NsqConfig};

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Boxed future returned by the object-safe broker traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Default largest message body accepted by `publish` (1 MiB, NSQ's default).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Default time a delivery may stay in flight without a touch.
pub const DEFAULT_MESSAGE_TIMEOUT: Duration = Duration::from_secs(60);

/// Broker errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// Body exceeds the broker's size limit
    #[error("Message of {size} bytes exceeds the {max} byte limit")]
    MessageTooLarge { size: usize, max: usize },

    /// Delivery was already finished, requeued or timed out
    #[error("Message {0} is no longer in flight")]
    NotInFlight(String),

    /// Topic or channel name rejected
    #[error("Invalid topic or channel name '{0}'")]
    InvalidName(String),

    /// Broker has been closed
    #[error("Broker is closed")]
    Closed,

    /// Transport-level failure
    #[error("Broker transport error: {0}")]
    Transport(String),
}

impl BrokerError {
    /// Whether retrying the same operation later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, BrokerError::Transport(_) | BrokerError::Closed)
    }
}

/// Publishing and subscribing side of a broker.
pub trait Broker: Send + Sync {
    /// Publishes `body` to every channel of `topic`.
    fn publish(&self, topic: &str, body: Vec<u8>) -> BoxFuture<'_, Result<(), BrokerError>>;

    /// Joins `channel` on `topic`, creating both as needed.
    fn subscribe(
        &self,
        topic: &str,
        channel: &str,
        max_in_flight: usize,
    ) -> BoxFuture<'_, Result<Box<dyn Subscription>, BrokerError>>;

    /// Largest body `publish` accepts.
    fn max_message_size(&self) -> usize;
}

/// Stream of deliveries from one channel.
pub trait Subscription: Send {
    /// Waits for the next delivery. `None` once the broker is closed.
    fn next(&mut self) -> BoxFuture<'_, Option<Arc<dyn Delivery>>>;
}

/// A delivered message awaiting acknowledgement.
///
/// All methods take `&self` so a heartbeat can touch the message while the
/// handler still owns it.
pub trait Delivery: Send + Sync {
    /// Broker-assigned message id.
    fn id(&self) -> &str;

    fn body(&self) -> &[u8];

    /// Delivery attempt, starting at 1.
    fn attempts(&self) -> u16;

    /// Resets the in-flight timeout.
    fn touch(&self) -> BoxFuture<'_, Result<(), BrokerError>>;

    /// Acknowledges the message; it will not be delivered again.
    fn finish(&self) -> BoxFuture<'_, Result<(), BrokerError>>;

    /// Returns the message to the channel after `delay`.
    fn requeue(&self, delay: Duration) -> BoxFuture<'_, Result<(), BrokerError>>;
}

/// Which broker implementation a process uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    /// [`MemoryBroker`]; all roles must share the process
    #[default]
    Memory,
    /// NSQ daemons, available with the `nsq` feature
    Nsq,
}

impl Transport {
    pub fn is_available(&self) -> bool {
        match self {
            Transport::Memory => true,
            Transport::Nsq => cfg!(feature = "nsq"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Memory => "memory",
            Transport::Nsq => "nsq",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Transport::Memory),
            "nsq" => Ok(Transport::Nsq),
            other => Err(format!("unknown transport '{}' (expected memory or nsq)", other)),
        }
    }
}

/// Checks a topic or channel name: 1-64 characters of `[A-Za-z0-9._-]`.
pub(crate) fn validate_name(name: &str) -> Result<(), BrokerError> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(BrokerError::InvalidName(name.to_string()))
    }
}
