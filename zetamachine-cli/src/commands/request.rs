//! Request command - publish generation requests for missing tiles.

use clap::Args;
use zetamachine::coord::TileAddress;
use zetamachine::messages::GenerateRequest;
use zetamachine::roles::RequestService;

use super::common::{parse_tile_address, print_request_summary, GlobalArgs, SweepArgs};
use crate::error::CliError;
use crate::runner::{load_config, shutdown_on_signal, CliRunner};

/// Arguments for the request command.
#[derive(Debug, Args)]
pub struct RequestArgs {
    #[command(flatten)]
    pub sweep: SweepArgs,

    /// Request a single tile, written as ZOOM/X/Y, instead of sweeping
    #[arg(long, value_parser = parse_tile_address, allow_hyphen_values = true)]
    pub tile: Option<TileAddress>,
}

/// Run the request command.
pub async fn run(args: RequestArgs, global: &GlobalArgs) -> Result<(), CliError> {
    let mut config = load_config(global.config.as_deref())?;
    args.sweep.apply(&mut config);

    let runner = CliRunner::new(config, global.debug)?;
    runner.log_startup("request");
    let config = runner.config();

    let service = RequestService::new(
        runner.network_broker()?,
        config.lease_manager(),
        config.request_config(),
    );

    if let Some(tile) = args.tile {
        if service.request(GenerateRequest::tile(tile)).await? {
            println!("Requested tile {}", tile);
        } else {
            println!("Tile {} is already stored or pending", tile);
        }
        return Ok(());
    }

    println!(
        "Requesting zoom {}-{} ({} sweep, unit {})",
        config.request.min_zoom,
        config.request.max_zoom,
        if config.request.core_only { "core" } else { "full" },
        config.request.unit
    );
    let summary = service.run(&shutdown_on_signal()).await?;
    print_request_summary(&summary);
    Ok(())
}
