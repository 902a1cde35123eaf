//! zetamachine CLI - Command-line interface
//!
//! Runs the pipeline roles as long-lived workers, or all of them at once
//! with `seed`, plus local rendering and config helpers.

mod commands;
mod error;
mod runner;

use clap::{Parser, Subcommand};

use commands::common::GlobalArgs;
use commands::config::ConfigCommands;
use commands::generate::GenerateArgs;
use commands::render::RenderArgs;
use commands::request::RequestArgs;
use commands::seed::SeedArgs;
use commands::store::StoreArgs;

#[derive(Parser)]
#[command(name = "zetamachine")]
#[command(version = zetamachine::VERSION)]
#[command(about = "Distributed zeta-fractal tile generation", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish generation requests for tiles not yet stored or pending
    Request(RequestArgs),

    /// Compute requested tiles and publish the results
    Generate(GenerateArgs),

    /// Persist computed tiles and release their leases
    Store(StoreArgs),

    /// Run request, generate and store together in this process
    Seed(SeedArgs),

    /// Compute one tile locally and write its preview PNG
    Render(RenderArgs),

    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let global = &cli.global;

    let result = match cli.command {
        Commands::Request(args) => commands::request::run(args, global).await,
        Commands::Generate(args) => commands::generate::run(args, global).await,
        Commands::Store(args) => commands::store::run(args, global).await,
        Commands::Seed(args) => commands::seed::run(args, global).await,
        Commands::Render(args) => commands::render::run(args, global).await,
        Commands::Config(command) => commands::config::run(command, global),
    };

    if let Err(e) = result {
        e.exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = Cli::try_parse_from([
            "zetamachine",
            "seed",
            "--max-zoom",
            "3",
            "--config",
            "/tmp/zeta.ini",
            "--debug",
        ])
        .unwrap();
        assert!(cli.global.debug);
        assert_eq!(cli.global.config.as_deref(), Some(std::path::Path::new("/tmp/zeta.ini")));
        match cli.command {
            Commands::Seed(args) => {
                assert_eq!(args.sweep.max_zoom, Some(3));
                assert!(!args.keep_running);
            }
            _ => panic!("expected seed"),
        }
    }

    #[test]
    fn test_render_accepts_negative_coordinates() {
        let cli = Cli::try_parse_from(["zetamachine", "render", "2/-2/-1", "--width", "64"]).unwrap();
        match cli.command {
            Commands::Render(args) => {
                assert_eq!((args.tile.zoom, args.tile.x, args.tile.y), (2, -2, -1));
                assert_eq!(args.width, Some(64));
            }
            _ => panic!("expected render"),
        }
    }

    #[test]
    fn test_unit_parses_through_from_str() {
        let cli = Cli::try_parse_from(["zetamachine", "request", "--unit", "patch"]).unwrap();
        match cli.command {
            Commands::Request(args) => {
                assert_eq!(args.sweep.unit, Some(zetamachine::roles::SweepUnit::Patch));
                assert!(args.tile.is_none());
            }
            _ => panic!("expected request"),
        }
    }
}
