//! INI serialization logic for converting `ConfigFile` → INI string.
//!
//! This module contains the `to_config_string()` function that produces
//! the commented INI representation written to `config.ini`.

use std::path::Path;

use super::defaults::{ENV_NSQD, ENV_NSQLOOKUP, ENV_TILE_PATH};
use super::settings::ConfigFile;
use super::size::{format_duration, format_size};

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    format!(
        r#"[store]
; Root of the tile tree: {{root}}/{{zoom}}/{{y}}/{{zoom}}.{{y}}.{{x}}.dat.gz
; Overridden by {env_tile_path}
root = {root}
; Write a PNG preview next to each stored tile
preview = {preview}

[lease]
; A request marker older than this no longer blocks a new request
max_age = {max_age}

[compute]
; Backend: cpu or accelerator (requires the cuda feature)
backend = {backend}
; Pixels per tile side (power of two)
tile_width = {tile_width}
epsilon = {epsilon:e}
escape_radius = {escape_radius}
; max_iterations + 2 must fit 16 bits
max_iterations = {max_iterations}
chunks_per_thread = {chunks_per_thread}

[broker]
; Transport: memory (single process) or nsq (requires the nsq feature)
transport = {transport}
; Overridden by {env_nsqd}
nsqd = {nsqd}
; Overridden by {env_nsqlookup}
lookupd = {lookupd}
max_message_size = {max_message_size}
; Memory transport only; nsqd applies its own --msg-timeout
message_timeout = {message_timeout}

[generate]
max_in_flight = {generate_in_flight}
; Heartbeat while a tile computes
touch_interval = {touch_interval}
shutdown_grace = {generate_grace}

[store_worker]
; 0 = one per CPU
max_in_flight = {store_in_flight}
shutdown_grace = {store_grace}

[request]
min_zoom = {min_zoom}
max_zoom = {max_zoom}
; Only request the region around the origin at each zoom
core_only = {core_only}
; tile or patch
unit = {unit}

[logging]
file = {log_file}
"#,
        env_tile_path = ENV_TILE_PATH,
        root = path_to_string(&config.store.root),
        preview = config.store.preview,
        max_age = format_duration(config.lease.max_age),
        backend = config.compute.backend,
        tile_width = config.compute.tile_width,
        epsilon = config.compute.epsilon,
        escape_radius = config.compute.escape_radius,
        max_iterations = config.compute.max_iterations,
        chunks_per_thread = config.compute.chunks_per_thread,
        transport = config.broker.transport,
        env_nsqd = ENV_NSQD,
        nsqd = config.broker.nsqd,
        env_nsqlookup = ENV_NSQLOOKUP,
        lookupd = config.broker.lookupd,
        max_message_size = format_size(config.broker.max_message_size),
        message_timeout = format_duration(config.broker.message_timeout),
        generate_in_flight = config.generate.max_in_flight,
        touch_interval = format_duration(config.generate.touch_interval),
        generate_grace = format_duration(config.generate.shutdown_grace),
        store_in_flight = config.store_worker.max_in_flight,
        store_grace = format_duration(config.store_worker.shutdown_grace),
        min_zoom = config.request.min_zoom,
        max_zoom = config.request.max_zoom,
        core_only = config.request.core_only,
        unit = config.request.unit,
        log_file = path_to_string(&config.logging.file),
    )
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
