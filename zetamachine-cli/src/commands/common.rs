//! Common types and utilities shared across CLI commands.

use std::path::PathBuf;

use clap::Args;
use tokio::task::JoinHandle;
use zetamachine::broker::BrokerError;
use zetamachine::config::ConfigFile;
use zetamachine::coord::TileAddress;
use zetamachine::roles::{RequestSummary, ServiceError, SweepUnit};
use zetamachine::worker::PoolStats;

use crate::error::CliError;

/// Options accepted by every subcommand.
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Config file (default: ~/.zetamachine/config.ini)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debug logging regardless of RUST_LOG
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Sweep overrides shared by `request` and `seed`.
#[derive(Debug, Default, Args)]
pub struct SweepArgs {
    /// First zoom level to request (overrides [request] min_zoom)
    #[arg(long)]
    pub min_zoom: Option<u8>,

    /// Last zoom level to request (overrides [request] max_zoom)
    #[arg(long)]
    pub max_zoom: Option<u8>,

    /// Sweep every tile of each zoom instead of the core region
    #[arg(long)]
    pub full: bool,

    /// Request unit: tile or patch (overrides [request] unit)
    #[arg(long)]
    pub unit: Option<SweepUnit>,
}

impl SweepArgs {
    /// Apply the overrides that were given.
    pub fn apply(&self, config: &mut ConfigFile) {
        if let Some(zoom) = self.min_zoom {
            config.request.min_zoom = zoom;
        }
        if let Some(zoom) = self.max_zoom {
            config.request.max_zoom = zoom;
        }
        if self.full {
            config.request.core_only = false;
        }
        if let Some(unit) = self.unit {
            config.request.unit = unit;
        }
    }
}

/// Parse a tile address written as `ZOOM/X/Y`.
pub fn parse_tile_address(s: &str) -> Result<TileAddress, String> {
    let parts: Vec<&str> = s.trim().split('/').collect();
    let [zoom, x, y] = parts.as_slice() else {
        return Err(format!("'{}' is not ZOOM/X/Y", s));
    };
    let zoom: u8 = zoom
        .parse()
        .map_err(|_| format!("invalid zoom '{}'", zoom))?;
    let x: i32 = x.parse().map_err(|_| format!("invalid x '{}'", x))?;
    let y: i32 = y.parse().map_err(|_| format!("invalid y '{}'", y))?;
    let tile = TileAddress::new(zoom, x, y).map_err(|e| e.to_string())?;
    if !tile.in_bounds() {
        return Err(format!("tile {} lies outside the grid of zoom {}", tile, zoom));
    }
    Ok(tile)
}

/// Print per-zoom request counts.
pub fn print_request_summary(summary: &RequestSummary) {
    for zoom in &summary.zooms {
        println!(
            "  zoom {:>2}: {} {} requests sent, {} skipped",
            zoom.zoom, zoom.sent, zoom.unit, zoom.skipped
        );
    }
    println!(
        "Requested {} ({} already stored or pending){}",
        summary.sent(),
        summary.skipped(),
        if summary.cancelled { ", cancelled" } else { "" }
    );
}

/// Print what a consumer pool handled before it stopped.
pub fn print_pool_stats(role: &str, stats: &PoolStats) {
    println!(
        "{}: {} finished, {} requeued, {} failed",
        role, stats.finished, stats.requeued, stats.failed
    );
    if stats.ack_errors > 0 {
        println!(
            "{}: {} acknowledgements rejected by the broker",
            role, stats.ack_errors
        );
    }
}

/// Wait for a spawned consumer pool.
pub async fn join_pool(
    handle: JoinHandle<Result<PoolStats, BrokerError>>,
) -> Result<PoolStats, CliError> {
    let stats = handle
        .await
        .map_err(|e| CliError::Service(ServiceError::Task(e.to_string())))??;
    Ok(stats)
}
