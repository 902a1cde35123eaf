//! Message consumption machinery shared by the generate and store roles.
//!
//! - [`ConsumerPool`] pulls from one channel with bounded concurrency and
//!   applies each handler's [`Disposition`]
//! - [`Heartbeat`] keeps a long-running delivery in flight

mod heartbeat;
mod pool;

pub use heartbeat::{Heartbeat, HeartbeatHandle, DEFAULT_TOUCH_INTERVAL};
pub use pool::{
    ConsumerPool, ConsumerPoolConfig, Disposition, MessageHandler, PoolStats,
    DEFAULT_SHUTDOWN_GRACE,
};
