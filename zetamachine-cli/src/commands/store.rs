//! Store command - persist computed tiles and release their leases.

use clap::Args;
use zetamachine::roles::StoreService;

use super::common::{print_pool_stats, GlobalArgs};
use crate::error::CliError;
use crate::runner::{load_config, shutdown_on_signal, CliRunner};

/// Arguments for the store command.
#[derive(Debug, Args)]
pub struct StoreArgs {
    /// Results written at once, 0 for one per CPU
    /// (overrides [store_worker] max_in_flight)
    #[arg(long)]
    pub max_in_flight: Option<usize>,
}

/// Run the store command until interrupted.
pub async fn run(args: StoreArgs, global: &GlobalArgs) -> Result<(), CliError> {
    let mut config = load_config(global.config.as_deref())?;
    if let Some(max_in_flight) = args.max_in_flight {
        config.store_worker.max_in_flight = max_in_flight;
    }

    let runner = CliRunner::new(config, global.debug)?;
    runner.log_startup("store");
    let config = runner.config();

    let service = StoreService::new(
        runner.network_broker()?,
        config.lease_manager(),
        config.store_config(),
    );

    println!("Storing tiles under {}, press Ctrl+C to stop", config.store.root.display());
    let stats = service.run(shutdown_on_signal()).await?;
    print_pool_stats("store", &stats);
    Ok(())
}
