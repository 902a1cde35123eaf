//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::path::PathBuf;
use std::process;
use zetamachine::broker::BrokerError;
use zetamachine::compute::ComputeError;
use zetamachine::config::ConfigFileError;
use zetamachine::roles::ServiceError;
use zetamachine::store::StoreError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration file could not be read or is invalid
    Config(ConfigFileError),
    /// Settings are valid but unusable for this command
    Unsupported(String),
    /// Compute backend could not be built or failed
    Compute(ComputeError),
    /// Broker stopped a consumer pool
    Broker(BrokerError),
    /// A role failed outright
    Service(ServiceError),
    /// Preview could not be rendered
    Render(StoreError),
    /// Failed to write output file
    FileWrite { path: PathBuf, error: std::io::Error },
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        // Print additional help for specific errors
        match self {
            CliError::Config(ConfigFileError::InvalidValue { section, key, .. }) => {
                eprintln!();
                eprintln!(
                    "Fix [{}] {} in the config file, or remove it to use the default.",
                    section, key
                );
                eprintln!("Run 'zetamachine config path' to locate the file.");
            }
            CliError::Broker(BrokerError::Transport(_)) => {
                eprintln!();
                eprintln!("Common issues:");
                eprintln!("  1. nsqd or nsqlookupd not running");
                eprintln!("  2. Wrong addresses: check [broker] nsqd and lookupd");
                eprintln!("  3. ZETA_NSQD or ZETA_NSQLOOKUP overriding the config file");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Unsupported(msg) => write!(f, "{}", msg),
            CliError::Compute(e) => write!(f, "Compute backend error: {}", e),
            CliError::Broker(e) => write!(f, "Broker error: {}", e),
            CliError::Service(e) => write!(f, "{}", e),
            CliError::Render(e) => write!(f, "Failed to render preview: {}", e),
            CliError::FileWrite { path, error } => {
                write!(f, "Failed to write file '{}': {}", path.display(), error)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Compute(e) => Some(e),
            CliError::Broker(e) => Some(e),
            CliError::Service(e) => Some(e),
            CliError::Render(e) => Some(e),
            CliError::FileWrite { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e)
    }
}

impl From<ComputeError> for CliError {
    fn from(e: ComputeError) -> Self {
        CliError::Compute(e)
    }
}

impl From<BrokerError> for CliError {
    fn from(e: BrokerError) -> Self {
        CliError::Broker(e)
    }
}

impl From<ServiceError> for CliError {
    fn from(e: ServiceError) -> Self {
        CliError::Service(e)
    }
}
