//! The three pipeline roles.
//!
//! ```text
//! RequestService ──request-tile──► GenerateService ──store-tile──► StoreService ──► disk
//!        │                                 │
//!   lease markers                     tile-errors (dead letters)
//! ```
//!
//! Each service owns its broker handle and, for the consuming roles, its
//! [`ConsumerPool`](crate::worker::ConsumerPool). They share nothing else
//! and can run in one process or on separate machines.

mod generate;
mod request;
mod store;
pub mod sweep;

pub use generate::{GenerateConfig, GenerateService, DEFAULT_REQUEUE_DELAY};
pub use request::{RequestConfig, RequestService, RequestSummary, ZoomSummary};
pub use store::{StoreConfig, StoreService};
pub use sweep::{SweepUnit, ZoomPlan};

use crate::broker::BrokerError;
use crate::compute::ComputeError;
use crate::lease::LeaseError;
use crate::messages::MessageError;
use crate::store::StoreError;
use crate::tile::TileError;
use thiserror::Error;

/// Errors raised inside a role.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Lease(#[from] LeaseError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error(transparent)]
    Compute(#[from] ComputeError),

    #[error(transparent)]
    Tile(#[from] TileError),

    /// A blocking task panicked or was aborted
    #[error("Background task failed: {0}")]
    Task(String),
}
