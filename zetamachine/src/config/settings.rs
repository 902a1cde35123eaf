//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing or serialization logic.

use crate::broker::Transport;
use crate::compute::BackendKind;
use crate::roles::SweepUnit;
use std::path::PathBuf;
use std::time::Duration;

/// Complete application configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    /// Tile store settings
    pub store: StoreSettings,
    /// Lease marker settings
    pub lease: LeaseSettings,
    /// Compute backend and escape settings
    pub compute: ComputeSettings,
    /// Broker transport settings
    pub broker: BrokerSettings,
    /// Generation role settings
    pub generate: GenerateSettings,
    /// Store role settings
    pub store_worker: StoreWorkerSettings,
    /// Request sweep settings
    pub request: RequestSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// Tile store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    /// Root directory of the tile tree
    pub root: PathBuf,
    /// Write a PNG preview next to each tile
    pub preview: bool,
}

/// Lease configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseSettings {
    /// A marker older than this no longer blocks a new request
    pub max_age: Duration,
}

/// Compute configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeSettings {
    pub backend: BackendKind,
    /// Pixels per tile side
    pub tile_width: usize,
    /// Convergence threshold on the real part
    pub epsilon: f64,
    /// Magnitude at which a point counts as escaped
    pub escape_radius: f64,
    pub max_iterations: u32,
    /// Work chunks per hardware thread
    pub chunks_per_thread: usize,
}

/// Broker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    pub transport: Transport,
    /// `host:port` of nsqd
    pub nsqd: String,
    /// `host:port` of nsqlookupd
    pub lookupd: String,
    /// Largest message body in bytes
    pub max_message_size: usize,
    /// In-flight time before an untouched message is redelivered
    /// (memory transport; NSQ uses the daemon's setting)
    pub message_timeout: Duration,
}

/// Generation role configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateSettings {
    pub max_in_flight: usize,
    /// Heartbeat interval while computing
    pub touch_interval: Duration,
    /// Time in-flight work gets to finish at shutdown
    pub shutdown_grace: Duration,
}

/// Store role configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreWorkerSettings {
    /// 0 = number of CPUs
    pub max_in_flight: usize,
    pub shutdown_grace: Duration,
}

/// Request sweep configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSettings {
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// Restrict the sweep to the region around the origin
    pub core_only: bool,
    pub unit: SweepUnit,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Log file path, cleared at startup
    pub file: PathBuf,
}
