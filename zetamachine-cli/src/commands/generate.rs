//! Generate command - compute requested tiles and publish the results.

use clap::Args;
use zetamachine::compute::BackendKind;
use zetamachine::roles::GenerateService;

use super::common::{print_pool_stats, GlobalArgs};
use crate::error::CliError;
use crate::runner::{load_config, shutdown_on_signal, CliRunner};

/// Arguments for the generate command.
#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Requests computed at once (overrides [generate] max_in_flight)
    #[arg(long)]
    pub max_in_flight: Option<usize>,

    /// Compute backend: cpu or accelerator (overrides [compute] backend)
    #[arg(long)]
    pub backend: Option<BackendKind>,
}

/// Run the generate command until interrupted.
pub async fn run(args: GenerateArgs, global: &GlobalArgs) -> Result<(), CliError> {
    let mut config = load_config(global.config.as_deref())?;
    if let Some(max_in_flight) = args.max_in_flight {
        config.generate.max_in_flight = max_in_flight;
    }
    if let Some(backend) = args.backend {
        config.compute.backend = backend;
    }

    let runner = CliRunner::new(config, global.debug)?;
    runner.log_startup("generate");

    let broker = runner.network_broker()?;
    let backend = runner.backend()?;
    let service = GenerateService::new(broker, backend, runner.config().generate_config());

    println!("Generating tiles, press Ctrl+C to stop");
    let stats = service.run(shutdown_on_signal()).await?;
    print_pool_stats("generate", &stats);
    Ok(())
}
