//! Default values and constants for all configuration settings.
//!
//! Contains all `DEFAULT_*` constants and the `ConfigFile::default()`
//! implementation.

use std::path::PathBuf;
use std::time::Duration;

use super::settings::*;
use crate::broker::{Transport, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_MESSAGE_TIMEOUT};
use crate::compute::escape::{DEFAULT_EPSILON, DEFAULT_ESCAPE_RADIUS, DEFAULT_MAX_ITERATIONS};
use crate::compute::kernel::DEFAULT_CHUNKS_PER_THREAD;
use crate::compute::BackendKind;
use crate::coord::TILE_WIDTH;
use crate::lease::DEFAULT_MAX_LEASE_AGE;
use crate::roles::SweepUnit;
use crate::worker::{DEFAULT_SHUTDOWN_GRACE, DEFAULT_TOUCH_INTERVAL};

/// Default tile root, relative to the working directory.
pub const DEFAULT_TILE_ROOT: &str = "tiles";

/// Default nsqd address.
pub const DEFAULT_NSQD: &str = "127.0.0.1:4150";

/// Default nsqlookupd address.
pub const DEFAULT_NSQLOOKUPD: &str = "127.0.0.1:4161";

/// Default generation concurrency. Each request already uses every core.
pub const DEFAULT_GENERATE_IN_FLIGHT: usize = 1;

/// Default lowest zoom of a request sweep.
pub const DEFAULT_MIN_ZOOM: u8 = 0;

/// Default highest zoom of a request sweep.
pub const DEFAULT_MAX_ZOOM: u8 = 4;

/// Shortest accepted heartbeat interval.
pub const MIN_TOUCH_INTERVAL: Duration = Duration::from_secs(1);

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "zetamachine.log";

/// Environment variable overriding `store.root`.
pub const ENV_TILE_PATH: &str = "ZETA_TILE_PATH";

/// Environment variable overriding `broker.nsqd`.
pub const ENV_NSQD: &str = "ZETA_NSQD";

/// Environment variable overriding `broker.lookupd`.
pub const ENV_NSQLOOKUP: &str = "ZETA_NSQLOOKUP";

/// Default log file path (~/.zetamachine/logs/zetamachine.log).
pub fn default_log_file() -> PathBuf {
    super::file::config_directory()
        .join("logs")
        .join(DEFAULT_LOG_FILE)
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            store: StoreSettings {
                root: PathBuf::from(DEFAULT_TILE_ROOT),
                preview: true,
            },
            lease: LeaseSettings {
                max_age: DEFAULT_MAX_LEASE_AGE,
            },
            compute: ComputeSettings {
                backend: BackendKind::Cpu,
                tile_width: TILE_WIDTH,
                epsilon: DEFAULT_EPSILON,
                escape_radius: DEFAULT_ESCAPE_RADIUS,
                max_iterations: DEFAULT_MAX_ITERATIONS,
                chunks_per_thread: DEFAULT_CHUNKS_PER_THREAD,
            },
            broker: BrokerSettings {
                transport: Transport::Memory,
                nsqd: DEFAULT_NSQD.to_string(),
                lookupd: DEFAULT_NSQLOOKUPD.to_string(),
                max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
                message_timeout: DEFAULT_MESSAGE_TIMEOUT,
            },
            generate: GenerateSettings {
                max_in_flight: DEFAULT_GENERATE_IN_FLIGHT,
                touch_interval: DEFAULT_TOUCH_INTERVAL,
                shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            },
            store_worker: StoreWorkerSettings {
                max_in_flight: 0,
                shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            },
            request: RequestSettings {
                min_zoom: DEFAULT_MIN_ZOOM,
                max_zoom: DEFAULT_MAX_ZOOM,
                core_only: true,
                unit: SweepUnit::Tile,
            },
            logging: LoggingSettings {
                file: default_log_file(),
            },
        }
    }
}
