//! Configuration CLI commands.
//!
//! Provides `config path`, `config show`, and `config init` for locating,
//! inspecting, and creating the configuration file.

use clap::Subcommand;
use zetamachine::config::ConfigFile;

use super::common::GlobalArgs;
use crate::error::CliError;
use crate::runner::{config_location, load_config};

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Print the effective configuration
    ///
    /// Values come from the file, then environment overrides
    /// (ZETA_TILE_PATH, ZETA_NSQD, ZETA_NSQLOOKUP), then defaults.
    Show,

    /// Write a configuration file with default values if none exists
    Init,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, global: &GlobalArgs) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => run_path(global),
        ConfigCommands::Show => run_show(global),
        ConfigCommands::Init => run_init(global),
    }
}

/// Show the configuration file path.
fn run_path(global: &GlobalArgs) -> Result<(), CliError> {
    println!("{}", config_location(global.config.as_deref()));
    Ok(())
}

/// Print the effective configuration as INI.
fn run_show(global: &GlobalArgs) -> Result<(), CliError> {
    let config = load_config(global.config.as_deref())?;
    println!("; {}", config_location(global.config.as_deref()));
    print!("{}", config.to_ini_string());

    if let Err(e) = config.validate() {
        eprintln!();
        eprintln!("Warning: {}", e);
    }
    Ok(())
}

/// Create the configuration file.
fn run_init(global: &GlobalArgs) -> Result<(), CliError> {
    let path = match global.config.as_deref() {
        Some(path) if path.exists() => {
            println!("{} already exists", path.display());
            return Ok(());
        }
        Some(path) => {
            ConfigFile::default().save_to(path)?;
            path.to_path_buf()
        }
        None => ConfigFile::ensure_exists()?,
    };
    println!("Configuration at {}", path.display());
    Ok(())
}
