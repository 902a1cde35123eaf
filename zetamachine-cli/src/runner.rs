//! CLI runner for common setup and operations.
//!
//! Encapsulates config loading, logging initialization, shutdown signals,
//! and broker and backend construction to reduce duplication across
//! command handlers.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use zetamachine::broker::{Broker, Transport};
use zetamachine::compute::{build_backend, ComputeBackend};
use zetamachine::config::{config_file_path, ConfigFile};
use zetamachine::logging::{init_logging, LoggingGuard, LoggingOptions};

use crate::error::CliError;

/// Load the config file named on the command line, or the default one.
pub fn load_config(path: Option<&Path>) -> Result<ConfigFile, CliError> {
    let config = match path {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };
    Ok(config)
}

/// Display path of the config file in use.
pub fn config_location(path: Option<&Path>) -> String {
    path.map(Path::to_path_buf)
        .unwrap_or_else(config_file_path)
        .display()
        .to_string()
}

/// Runner that manages CLI lifecycle and common operations.
pub struct CliRunner {
    /// Logging guard - keeps logging active while runner exists
    _logging_guard: LoggingGuard,
    /// Validated configuration, command-line overrides applied
    config: ConfigFile,
}

impl CliRunner {
    /// Validate the configuration and start logging.
    ///
    /// # Arguments
    ///
    /// * `debug_mode` - When true, enables debug-level logging regardless of RUST_LOG
    pub fn new(config: ConfigFile, debug_mode: bool) -> Result<Self, CliError> {
        config.validate()?;

        let options = LoggingOptions {
            stdout: true,
            debug: debug_mode,
        };
        let logging_guard = init_logging(&config.logging.file, options)
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        Ok(Self {
            _logging_guard: logging_guard,
            config,
        })
    }

    /// Get the effective configuration.
    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("zetamachine v{}", zetamachine::VERSION);
        info!(
            command,
            transport = %self.config.broker.transport,
            backend = %self.config.compute.backend,
            tiles = %self.config.store.root.display(),
            "Starting"
        );
    }

    /// Build the configured compute backend.
    pub fn backend(&self) -> Result<Arc<dyn ComputeBackend>, CliError> {
        let backend = build_backend(
            self.config.compute.backend,
            self.config.escape_config(),
            self.config.compute.chunks_per_thread,
        )?;
        info!(backend = backend.name(), "Compute backend ready");
        Ok(backend)
    }

    /// Broker for a role running on its own.
    ///
    /// The memory transport cannot reach other processes, so only the
    /// networked transport is accepted here.
    pub fn network_broker(&self) -> Result<Arc<dyn Broker>, CliError> {
        match self.config.broker.transport {
            Transport::Memory => Err(CliError::Unsupported(
                "The memory transport only connects roles inside one process. \
                 Use 'zetamachine seed', or set [broker] transport = nsq."
                    .to_string(),
            )),
            Transport::Nsq => self.nsq_broker(),
        }
    }

    #[cfg(feature = "nsq")]
    fn nsq_broker(&self) -> Result<Arc<dyn Broker>, CliError> {
        use zetamachine::broker::{NsqBroker, NsqConfig};

        let settings = &self.config.broker;
        Ok(Arc::new(NsqBroker::new(NsqConfig {
            nsqd: settings.nsqd.clone(),
            lookupd: settings.lookupd.clone(),
            max_message_size: settings.max_message_size,
        })))
    }

    #[cfg(not(feature = "nsq"))]
    fn nsq_broker(&self) -> Result<Arc<dyn Broker>, CliError> {
        Err(CliError::Unsupported(
            "This build has no NSQ support; rebuild with --features nsq".to_string(),
        ))
    }
}

/// Token cancelled on Ctrl-C or SIGTERM.
///
/// Must be called from within the runtime.
pub fn shutdown_on_signal() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown requested, finishing in-flight work");
        trigger.cancel();
    });
    token
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGTERM");
            ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c().await;
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
