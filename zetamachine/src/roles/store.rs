//! Store role: persists computed tiles and releases their leases.

use super::generate::DEFAULT_REQUEUE_DELAY;
use super::ServiceError;
use crate::broker::{BoxFuture, Broker, BrokerError, Delivery};
use crate::lease::LeaseManager;
use crate::messages::{decode_result, RESULT_TOPIC, STORE_CHANNEL};
use crate::tile::Tile;
use crate::worker::{
    ConsumerPool, ConsumerPoolConfig, Disposition, MessageHandler, PoolStats,
    DEFAULT_SHUTDOWN_GRACE,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Store role settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Results saved at once; `0` uses one per CPU
    pub max_in_flight: usize,
    pub shutdown_grace: Duration,
    pub requeue_delay: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 0,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            requeue_delay: DEFAULT_REQUEUE_DELAY,
        }
    }
}

impl StoreConfig {
    /// Concurrency after resolving `0` to the CPU count.
    pub fn effective_max_in_flight(&self) -> usize {
        match self.max_in_flight {
            0 => num_cpus::get(),
            n => n,
        }
    }
}

/// Consumes `store-tile`, writing each tile to the [`TileStore`](crate::store::TileStore)
/// behind the lease manager.
pub struct StoreService {
    broker: Arc<dyn Broker>,
    leases: LeaseManager,
    config: StoreConfig,
}

impl StoreService {
    pub fn new(broker: Arc<dyn Broker>, leases: LeaseManager, config: StoreConfig) -> Self {
        Self {
            broker,
            leases,
            config,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Consumes results until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) -> Result<PoolStats, BrokerError> {
        let pool_config = ConsumerPoolConfig {
            name: "store".into(),
            topic: RESULT_TOPIC.into(),
            channel: STORE_CHANNEL.into(),
            max_in_flight: self.config.effective_max_in_flight(),
            shutdown_grace: self.config.shutdown_grace,
        };
        info!(
            root = %self.leases.store().root().display(),
            preview = self.leases.store().preview_enabled(),
            "Store service starting"
        );
        let broker = Arc::clone(&self.broker);
        ConsumerPool::new(broker, Arc::new(self), pool_config)
            .run(shutdown)
            .await
    }

    /// Handles one result delivery.
    pub async fn process(&self, delivery: &Arc<dyn Delivery>) -> Disposition {
        if delivery.body().is_empty() {
            debug!(id = delivery.id(), "Empty result body");
            return Disposition::Finish;
        }

        let tile: Tile = match decode_result(delivery.body()) {
            Ok(result) => result.into(),
            Err(e) => {
                warn!(id = delivery.id(), error = %e, "Dropping undecodable result");
                return Disposition::Finish;
            }
        };
        let address = tile.address;

        match self.save(tile).await {
            Ok(released) => {
                debug!(tile = %address, released, "Tile stored");
                Disposition::Finish
            }
            Err(e) => {
                error!(tile = %address, error = %e, "Failed to store tile, requeueing");
                Disposition::Requeue(self.config.requeue_delay)
            }
        }
    }

    /// Saves the tile, then drops its lease. Returns whether a lease was held.
    async fn save(&self, tile: Tile) -> Result<bool, ServiceError> {
        let leases = self.leases.clone();
        tokio::task::spawn_blocking(move || -> Result<bool, ServiceError> {
            leases.store().save(&tile)?;
            Ok(leases.received(&tile.address)?)
        })
        .await
        .map_err(|e| ServiceError::Task(e.to_string()))?
    }
}

impl MessageHandler for StoreService {
    fn handle(&self, delivery: Arc<dyn Delivery>, _cancel: CancellationToken) -> BoxFuture<'_, Disposition> {
        Box::pin(async move { self.process(&delivery).await })
    }
}
