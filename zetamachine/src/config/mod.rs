//! Configuration for all roles.
//!
//! A single INI file (`~/.zetamachine/config.ini` by default) configures
//! every role, so a fleet can share one file and start different
//! subcommands from it. Missing keys fall back to [`defaults`]; a few
//! deployment-specific keys can be overridden from the environment.
//!
//! ```
//! use zetamachine::config::ConfigFile;
//!
//! let config = ConfigFile::default();
//! config.validate().unwrap();
//! let escape = config.escape_config();
//! assert_eq!(escape.max_iterations, 5000);
//! ```

pub mod defaults;
mod file;
mod parser;
mod settings;
mod size;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::*;
pub use size::{format_duration, format_size, parse_duration, parse_size, UnitParseError};
