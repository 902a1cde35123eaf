//! Generation role: computes requested tiles and publishes the results.
//!
//! Each request runs the compute backend on a blocking thread while a
//! [`Heartbeat`] keeps the message in flight. Results are published before
//! the request is acknowledged, so a crash between the two only costs a
//! duplicate computation.
//!
//! | outcome                           | disposition                       |
//! |-----------------------------------|-----------------------------------|
//! | empty or malformed body           | finish (dropped)                  |
//! | compute cancelled at shutdown     | requeue immediately               |
//! | a result exceeds the message size | original body to `tile-errors`, finish |
//! | backend error                     | original body to `tile-errors`, finish |
//! | broker failure while publishing   | requeue after `requeue_delay`     |
//! | all results published             | finish                            |

use super::ServiceError;
use crate::broker::{BoxFuture, Broker, BrokerError, Delivery};
use crate::compute::{ComputeBackend, Iterations};
use crate::coord::{PATCH_TILES, TILE_WIDTH};
use crate::messages::{
    decode_request, encode, GenerateRequest, GenerateResult, ERROR_TOPIC, GENERATE_CHANNEL,
    REQUEST_TOPIC, RESULT_TOPIC,
};
use crate::tile::{Patch, Tile, TileData};
use crate::worker::{
    ConsumerPool, ConsumerPoolConfig, Disposition, Heartbeat, MessageHandler, PoolStats,
    DEFAULT_SHUTDOWN_GRACE, DEFAULT_TOUCH_INTERVAL,
};
use num_complex::Complex64;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default delay before a request that hit a broker failure is retried.
pub const DEFAULT_REQUEUE_DELAY: Duration = Duration::from_secs(10);

/// Generation role settings.
#[derive(Debug, Clone)]
pub struct GenerateConfig {
    /// Pixels per tile side
    pub tile_width: usize,
    /// Requests computed at once
    pub max_in_flight: usize,
    pub touch_interval: Duration,
    pub shutdown_grace: Duration,
    pub requeue_delay: Duration,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            tile_width: TILE_WIDTH,
            max_in_flight: 1,
            touch_interval: DEFAULT_TOUCH_INTERVAL,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            requeue_delay: DEFAULT_REQUEUE_DELAY,
        }
    }
}

/// Consumes `request-tile` and publishes to `store-tile`.
pub struct GenerateService {
    broker: Arc<dyn Broker>,
    backend: Arc<dyn ComputeBackend>,
    config: GenerateConfig,
}

impl GenerateService {
    pub fn new(
        broker: Arc<dyn Broker>,
        backend: Arc<dyn ComputeBackend>,
        config: GenerateConfig,
    ) -> Self {
        Self {
            broker,
            backend,
            config,
        }
    }

    pub fn config(&self) -> &GenerateConfig {
        &self.config
    }

    /// Consumes requests until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) -> Result<PoolStats, BrokerError> {
        let pool_config = ConsumerPoolConfig {
            name: "generate".into(),
            topic: REQUEST_TOPIC.into(),
            channel: GENERATE_CHANNEL.into(),
            max_in_flight: self.config.max_in_flight,
            shutdown_grace: self.config.shutdown_grace,
        };
        info!(
            backend = self.backend.name(),
            tile_width = self.config.tile_width,
            "Generation service starting"
        );
        let broker = Arc::clone(&self.broker);
        ConsumerPool::new(broker, Arc::new(self), pool_config)
            .run(shutdown)
            .await
    }

    /// Handles one request delivery.
    pub async fn process(&self, delivery: &Arc<dyn Delivery>, cancel: &CancellationToken) -> Disposition {
        let request = match decode_request(delivery.body()) {
            Ok(request) => request,
            Err(e) => {
                warn!(id = delivery.id(), error = %e, "Dropping undecodable request");
                return Disposition::Finish;
            }
        };

        let started = Instant::now();
        let heartbeat = Heartbeat::new(Arc::clone(delivery), self.config.touch_interval).spawn();
        let computed = self.compute(request, cancel).await;
        let touches = heartbeat.stop().await;

        let tiles = match computed {
            Ok(Some(tiles)) => tiles,
            Ok(None) => {
                info!(%request, "Compute cancelled, requeueing");
                return Disposition::Requeue(Duration::ZERO);
            }
            Err(ServiceError::Task(e)) => {
                error!(%request, error = %e, "Compute task failed");
                return Disposition::Requeue(self.config.requeue_delay);
            }
            Err(e) => {
                error!(%request, error = %e, "Compute failed");
                return self.dead_letter(delivery, request).await;
            }
        };

        debug!(
            %request,
            tiles = tiles.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            touches,
            "Compute finished"
        );

        match self.publish(tiles).await {
            Ok(()) => {
                info!(
                    %request,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Request generated"
                );
                Disposition::Finish
            }
            Err(BrokerError::MessageTooLarge { size, max }) => {
                warn!(%request, size, max, "Result exceeds the message size limit");
                self.dead_letter(delivery, request).await
            }
            Err(e) => {
                warn!(%request, error = %e, "Failed to publish results, requeueing");
                Disposition::Requeue(self.config.requeue_delay)
            }
        }
    }

    /// Runs the backend for a request and cuts the result into tiles.
    ///
    /// `Ok(None)` when cancelled.
    async fn compute(
        &self,
        request: GenerateRequest,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<Tile>>, ServiceError> {
        let tile_width = self.config.tile_width;
        let (min, max, width) = match request {
            GenerateRequest::Tile { address } => (address.min(), address.max(), tile_width),
            GenerateRequest::Patch { address } => {
                (address.min(), address.max(), tile_width * PATCH_TILES)
            }
        };

        let Some(counts) = self.compute_grid(min, max, width, cancel).await? else {
            return Ok(None);
        };
        let data = TileData::new(width, counts)?;

        let tiles = match request {
            GenerateRequest::Tile { address } => vec![Tile::new(address, data)],
            GenerateRequest::Patch { address } => Patch::new(address, data)?.split(),
        };
        Ok(Some(tiles))
    }

    async fn compute_grid(
        &self,
        min: Complex64,
        max: Complex64,
        width: usize,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<Iterations>>, ServiceError> {
        let backend = Arc::clone(&self.backend);
        let cancel = cancel.clone();
        let grid = tokio::task::spawn_blocking(move || backend.compute(min, max, width, &cancel))
            .await
            .map_err(|e| ServiceError::Task(e.to_string()))??;
        Ok(grid)
    }

    /// Publishes every tile, checking all sizes before the first publish so
    /// an oversize patch sends nothing.
    async fn publish(&self, tiles: Vec<Tile>) -> Result<(), BrokerError> {
        let max = self.broker.max_message_size();
        let mut bodies = Vec::with_capacity(tiles.len());
        for tile in tiles {
            let address = tile.address;
            let body = encode(&GenerateResult::from(tile))
                .map_err(|e| BrokerError::Transport(format!("encoding {}: {}", address, e)))?;
            if body.len() > max {
                return Err(BrokerError::MessageTooLarge {
                    size: body.len(),
                    max,
                });
            }
            bodies.push(body);
        }

        for body in bodies {
            self.broker.publish(RESULT_TOPIC, body).await?;
        }
        Ok(())
    }

    /// Sends the original request to the error topic. Finishes on success;
    /// requeues when even that fails so the request is not lost.
    async fn dead_letter(&self, delivery: &Arc<dyn Delivery>, request: GenerateRequest) -> Disposition {
        match self.broker.publish(ERROR_TOPIC, delivery.body().to_vec()).await {
            Ok(()) => {
                warn!(%request, topic = ERROR_TOPIC, "Request dead-lettered");
                Disposition::Finish
            }
            Err(e) => {
                error!(%request, error = %e, "Failed to dead-letter request, requeueing");
                Disposition::Requeue(self.config.requeue_delay)
            }
        }
    }
}

impl MessageHandler for GenerateService {
    fn handle(&self, delivery: Arc<dyn Delivery>, cancel: CancellationToken) -> BoxFuture<'_, Disposition> {
        Box::pin(async move { self.process(&delivery, &cancel).await })
    }
}
