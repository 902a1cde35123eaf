//! Request role: sweeps zoom levels and publishes generation requests.

use super::sweep::{SweepUnit, ZoomPlan};
use super::ServiceError;
use crate::broker::Broker;
use crate::coord::MAX_ZOOM;
use crate::lease::LeaseManager;
use crate::messages::{encode, GenerateRequest, REQUEST_TOPIC};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Sweep settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestConfig {
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// Restrict each zoom to the core region around the origin
    pub core_only: bool,
    pub unit: SweepUnit,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            min_zoom: 0,
            max_zoom: 4,
            core_only: true,
            unit: SweepUnit::Tile,
        }
    }
}

/// Counts for one zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomSummary {
    pub zoom: u8,
    pub unit: SweepUnit,
    /// Requests published
    pub sent: u64,
    /// Addresses already stored or leased
    pub skipped: u64,
}

/// Outcome of a sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestSummary {
    pub zooms: Vec<ZoomSummary>,
    /// The sweep stopped before visiting every address
    pub cancelled: bool,
}

impl RequestSummary {
    pub fn sent(&self) -> u64 {
        self.zooms.iter().map(|z| z.sent).sum()
    }

    pub fn skipped(&self) -> u64 {
        self.zooms.iter().map(|z| z.skipped).sum()
    }
}

/// Publishes generation requests for addresses that are neither stored nor
/// leased.
pub struct RequestService {
    broker: Arc<dyn Broker>,
    leases: LeaseManager,
    config: RequestConfig,
}

impl RequestService {
    pub fn new(broker: Arc<dyn Broker>, leases: LeaseManager, config: RequestConfig) -> Self {
        Self {
            broker,
            leases,
            config,
        }
    }

    pub fn config(&self) -> &RequestConfig {
        &self.config
    }

    /// Runs the sweep from `min_zoom` to `max_zoom`.
    ///
    /// Checks `cancel` between addresses; a cancelled sweep returns the
    /// counts so far with `cancelled` set.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RequestSummary, ServiceError> {
        let max_zoom = self.config.max_zoom.min(MAX_ZOOM);
        let mut summary = RequestSummary::default();

        info!(
            min_zoom = self.config.min_zoom,
            max_zoom,
            core_only = self.config.core_only,
            unit = %self.config.unit,
            "Request sweep started"
        );

        for zoom in self.config.min_zoom..=max_zoom {
            let plan = ZoomPlan::new(zoom, self.config.unit, self.config.core_only);
            if plan.unit != self.config.unit {
                debug!(zoom, "Patch grid not aligned, requesting single tiles");
            }

            let mut counts = ZoomSummary {
                zoom,
                unit: plan.unit,
                sent: 0,
                skipped: 0,
            };

            for request in plan.requests() {
                if cancel.is_cancelled() {
                    summary.zooms.push(counts);
                    summary.cancelled = true;
                    info!(
                        sent = summary.sent(),
                        skipped = summary.skipped(),
                        "Request sweep cancelled"
                    );
                    return Ok(summary);
                }

                if self.request(request).await? {
                    counts.sent += 1;
                } else {
                    counts.skipped += 1;
                }
            }

            info!(
                zoom,
                unit = %counts.unit,
                sent = counts.sent,
                skipped = counts.skipped,
                "Zoom level requested"
            );
            summary.zooms.push(counts);
        }

        info!(
            sent = summary.sent(),
            skipped = summary.skipped(),
            "Request sweep complete"
        );
        Ok(summary)
    }

    /// Leases and publishes one request. Returns `false` when skipped.
    pub async fn request(&self, request: GenerateRequest) -> Result<bool, ServiceError> {
        let leases = self.leases.clone();
        let wanted = tokio::task::spawn_blocking(move || match request {
            GenerateRequest::Tile { address } => leases.should_generate(&address),
            GenerateRequest::Patch { address } => leases.should_generate_patch(&address),
        })
        .await
        .map_err(|e| ServiceError::Task(e.to_string()))??;

        if !wanted {
            return Ok(false);
        }

        let body = encode(&request)?;
        if let Err(e) = self.broker.publish(REQUEST_TOPIC, body).await {
            warn!(%request, error = %e, "Failed to publish request, releasing lease");
            self.release(request).await;
            return Err(e.into());
        }

        debug!(%request, "Request published");
        Ok(true)
    }

    /// Drops the leases taken for an unpublished request so the next sweep
    /// retries it.
    async fn release(&self, request: GenerateRequest) {
        let leases = self.leases.clone();
        let released = tokio::task::spawn_blocking(move || match request {
            GenerateRequest::Tile { address } => leases.received(&address).map(|_| ()),
            GenerateRequest::Patch { address } => address
                .tiles()
                .try_for_each(|tile| leases.received(&tile).map(|_| ())),
        })
        .await;

        match released {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(%request, error = %e, "Failed to release lease"),
            Err(e) => warn!(%request, error = %e, "Lease release task failed"),
        }
    }
}
