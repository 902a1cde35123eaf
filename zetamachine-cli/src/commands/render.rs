//! Render command - compute one tile locally and write its preview PNG.
//!
//! Needs no broker: the tile is computed in-process with the configured
//! backend, which makes this the quickest way to inspect a region.

use std::path::PathBuf;

use clap::Args;
use tracing::info;
use zetamachine::coord::TileAddress;
use zetamachine::roles::ServiceError;
use zetamachine::store::{preview, PREVIEW_EXTENSION};
use zetamachine::tile::{Tile, TileData};

use super::common::{parse_tile_address, GlobalArgs};
use crate::error::CliError;
use crate::runner::{load_config, shutdown_on_signal, CliRunner};

/// Arguments for the render command.
#[derive(Debug, Args)]
pub struct RenderArgs {
    /// Tile to render, written as ZOOM/X/Y
    #[arg(value_parser = parse_tile_address, allow_hyphen_values = true)]
    pub tile: TileAddress,

    /// Pixels per tile side, a power of two (overrides [compute] tile_width)
    #[arg(long)]
    pub width: Option<usize>,

    /// Output PNG (default: ZOOM.Y.X.png in the current directory)
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Also save the tile into the tile tree
    #[arg(long)]
    pub save: bool,
}

/// Run the render command.
pub async fn run(args: RenderArgs, global: &GlobalArgs) -> Result<(), CliError> {
    let mut config = load_config(global.config.as_deref())?;
    if let Some(width) = args.width {
        config.compute.tile_width = width;
    }

    let runner = CliRunner::new(config, global.debug)?;
    runner.log_startup("render");
    let config = runner.config();

    let tile = args.tile;
    let width = config.compute.tile_width;
    let backend = runner.backend()?;
    let cancel = shutdown_on_signal();

    println!("Rendering tile {} ({}x{}) with {}", tile, width, width, backend.name());
    let counts = tokio::task::spawn_blocking(move || {
        backend.compute(tile.min(), tile.max(), width, &cancel)
    })
    .await
    .map_err(|e| ServiceError::Task(e.to_string()))??;

    let Some(counts) = counts else {
        println!("Cancelled");
        return Ok(());
    };
    let data = TileData::new(width, counts).map_err(ServiceError::from)?;

    let output = args.output.unwrap_or_else(|| default_output(&tile));
    let png = preview::encode_png(&data).map_err(CliError::Render)?;
    std::fs::write(&output, png).map_err(|error| CliError::FileWrite {
        path: output.clone(),
        error,
    })?;
    info!(tile = %tile, path = %output.display(), "Preview written");
    println!("Wrote {}", output.display());

    if args.save {
        let path = config
            .tile_store()
            .save(&Tile::new(tile, data))
            .map_err(ServiceError::from)?;
        println!("Saved {}", path.display());
    }
    Ok(())
}

/// `ZOOM.Y.X.png`, the naming the tile tree uses.
fn default_output(tile: &TileAddress) -> PathBuf {
    PathBuf::from(format!(
        "{}.{}.{}.{}",
        tile.zoom, tile.y, tile.x, PREVIEW_EXTENSION
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_matches_tree_naming() {
        let tile = TileAddress::new(3, -1, 2).unwrap();
        assert_eq!(default_output(&tile), PathBuf::from("3.2.-1.png"));
    }
}
