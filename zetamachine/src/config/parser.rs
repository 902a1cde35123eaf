//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This module contains the `parse_ini()` function and its helpers.
//! It is the single place where INI key names are mapped to struct fields.

use ini::{Ini, Properties};
use std::path::PathBuf;
use std::str::FromStr;

use super::defaults::{ENV_NSQD, ENV_NSQLOOKUP, ENV_TILE_PATH};
use super::file::ConfigFileError;
use super::settings::ConfigFile;
use super::size::{parse_duration, parse_size};

/// One INI section with typed, error-reporting getters.
struct Section<'a> {
    name: &'static str,
    properties: &'a Properties,
}

impl<'a> Section<'a> {
    fn get(&self, key: &str) -> Option<&'a str> {
        self.properties.get(key).map(str::trim)
    }

    fn invalid(&self, key: &str, value: &str, reason: impl Into<String>) -> ConfigFileError {
        ConfigFileError::InvalidValue {
            section: self.name.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    fn number<T: FromStr>(&self, key: &str, target: &mut T, reason: &str) -> Result<(), ConfigFileError> {
        if let Some(v) = self.get(key) {
            *target = v.parse().map_err(|_| self.invalid(key, v, reason))?;
        }
        Ok(())
    }

    fn parsed<T>(&self, key: &str, target: &mut T) -> Result<(), ConfigFileError>
    where
        T: FromStr<Err = String>,
    {
        if let Some(v) = self.get(key) {
            *target = v.parse().map_err(|reason: String| self.invalid(key, v, reason))?;
        }
        Ok(())
    }

    fn boolean(&self, key: &str, target: &mut bool) -> Result<(), ConfigFileError> {
        if let Some(v) = self.get(key) {
            *target = parse_bool(v).ok_or_else(|| self.invalid(key, v, "must be true or false"))?;
        }
        Ok(())
    }

    fn duration(&self, key: &str, target: &mut std::time::Duration) -> Result<(), ConfigFileError> {
        if let Some(v) = self.get(key) {
            *target = parse_duration(v).map_err(|e| self.invalid(key, v, e.to_string()))?;
        }
        Ok(())
    }

    fn size(&self, key: &str, target: &mut usize) -> Result<(), ConfigFileError> {
        if let Some(v) = self.get(key) {
            *target = parse_size(v).map_err(|e| self.invalid(key, v, e.to_string()))?;
        }
        Ok(())
    }

    fn text(&self, key: &str, target: &mut String) {
        if let Some(v) = self.get(key) {
            if !v.is_empty() {
                *target = v.to_string();
            }
        }
    }

    fn path(&self, key: &str, target: &mut PathBuf) {
        if let Some(v) = self.get(key) {
            if !v.is_empty() {
                *target = expand_tilde(v);
            }
        }
    }
}

fn section<'a>(ini: &'a Ini, name: &'static str) -> Option<Section<'a>> {
    ini.section(Some(name))
        .map(|properties| Section { name, properties })
}

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [store] section
    if let Some(s) = section(ini, "store") {
        s.path("root", &mut config.store.root);
        s.boolean("preview", &mut config.store.preview)?;
    }

    // [lease] section
    if let Some(s) = section(ini, "lease") {
        s.duration("max_age", &mut config.lease.max_age)?;
    }

    // [compute] section
    if let Some(s) = section(ini, "compute") {
        s.parsed("backend", &mut config.compute.backend)?;
        s.number("tile_width", &mut config.compute.tile_width, "must be a positive integer")?;
        s.number("epsilon", &mut config.compute.epsilon, "must be a number")?;
        s.number("escape_radius", &mut config.compute.escape_radius, "must be a number")?;
        s.number(
            "max_iterations",
            &mut config.compute.max_iterations,
            "must be a positive integer",
        )?;
        s.number(
            "chunks_per_thread",
            &mut config.compute.chunks_per_thread,
            "must be a positive integer",
        )?;
    }

    // [broker] section
    if let Some(s) = section(ini, "broker") {
        s.parsed("transport", &mut config.broker.transport)?;
        s.text("nsqd", &mut config.broker.nsqd);
        // An explicitly empty lookupd is kept so validation can reject it
        if let Some(v) = s.get("lookupd") {
            config.broker.lookupd = v.to_string();
        }
        s.size("max_message_size", &mut config.broker.max_message_size)?;
        s.duration("message_timeout", &mut config.broker.message_timeout)?;
    }

    // [generate] section
    if let Some(s) = section(ini, "generate") {
        s.number(
            "max_in_flight",
            &mut config.generate.max_in_flight,
            "must be a positive integer",
        )?;
        s.duration("touch_interval", &mut config.generate.touch_interval)?;
        s.duration("shutdown_grace", &mut config.generate.shutdown_grace)?;
    }

    // [store_worker] section
    if let Some(s) = section(ini, "store_worker") {
        s.number(
            "max_in_flight",
            &mut config.store_worker.max_in_flight,
            "must be a non-negative integer (0 = number of CPUs)",
        )?;
        s.duration("shutdown_grace", &mut config.store_worker.shutdown_grace)?;
    }

    // [request] section
    if let Some(s) = section(ini, "request") {
        s.number("min_zoom", &mut config.request.min_zoom, "must be an integer from 0 to 255")?;
        s.number("max_zoom", &mut config.request.max_zoom, "must be an integer from 0 to 255")?;
        s.boolean("core_only", &mut config.request.core_only)?;
        s.parsed("unit", &mut config.request.unit)?;
    }

    // [logging] section
    if let Some(s) = section(ini, "logging") {
        s.path("file", &mut config.logging.file);
    }

    Ok(config)
}

/// Applies environment overrides. `lookup` reads one variable.
pub(super) fn apply_env<F>(config: &mut ConfigFile, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(root) = non_empty(ENV_TILE_PATH) {
        config.store.root = expand_tilde(root.trim());
    }
    if let Some(nsqd) = non_empty(ENV_NSQD) {
        config.broker.nsqd = nsqd.trim().to_string();
    }
    if let Some(lookupd) = non_empty(ENV_NSQLOOKUP) {
        config.broker.lookupd = lookupd.trim().to_string();
    }
}

/// Parses common boolean spellings.
pub(super) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Expands a leading `~/` to the home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::Transport;
    use crate::compute::BackendKind;
    use crate::roles::SweepUnit;
    use std::collections::HashMap;
    use std::time::Duration;

    fn parse(text: &str) -> Result<ConfigFile, ConfigFileError> {
        parse_ini(&Ini::load_from_str(text).unwrap())
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(parse("").unwrap(), ConfigFile::default());
    }

    #[test]
    fn test_full_file() {
        let config = parse(
            r#"
[store]
root = /srv/tiles
preview = no
[lease]
max_age = 12h
[compute]
backend = cpu
tile_width = 128
epsilon = 1e-12
escape_radius = 5000
max_iterations = 2000
chunks_per_thread = 4
[broker]
transport = nsq
nsqd = broker:4150
lookupd = broker:4161
max_message_size = 4MB
message_timeout = 90s
[generate]
max_in_flight = 2
touch_interval = 15s
shutdown_grace = 1m
[store_worker]
max_in_flight = 8
[request]
min_zoom = 2
max_zoom = 9
core_only = false
unit = patch
[logging]
file = /var/log/zeta.log
"#,
        )
        .unwrap();

        assert_eq!(config.store.root, PathBuf::from("/srv/tiles"));
        assert!(!config.store.preview);
        assert_eq!(config.lease.max_age, Duration::from_secs(12 * 3600));
        assert_eq!(config.compute.backend, BackendKind::Cpu);
        assert_eq!(config.compute.tile_width, 128);
        assert_eq!(config.compute.epsilon, 1e-12);
        assert_eq!(config.compute.max_iterations, 2000);
        assert_eq!(config.compute.chunks_per_thread, 4);
        assert_eq!(config.broker.transport, Transport::Nsq);
        assert_eq!(config.broker.nsqd, "broker:4150");
        assert_eq!(config.broker.max_message_size, 4 << 20);
        assert_eq!(config.broker.message_timeout, Duration::from_secs(90));
        assert_eq!(config.generate.max_in_flight, 2);
        assert_eq!(config.generate.touch_interval, Duration::from_secs(15));
        assert_eq!(config.generate.shutdown_grace, Duration::from_secs(60));
        assert_eq!(config.store_worker.max_in_flight, 8);
        assert_eq!(config.request.min_zoom, 2);
        assert_eq!(config.request.max_zoom, 9);
        assert!(!config.request.core_only);
        assert_eq!(config.request.unit, SweepUnit::Patch);
        assert_eq!(config.logging.file, PathBuf::from("/var/log/zeta.log"));
    }

    #[test]
    fn test_invalid_value_names_key() {
        let err = parse("[lease]\nmax_age = forever\n").unwrap_err();
        match err {
            ConfigFileError::InvalidValue {
                section, key, value, ..
            } => {
                assert_eq!(section, "lease");
                assert_eq!(key, "max_age");
                assert_eq!(value, "forever");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_invalid_enums() {
        let err = parse("[broker]\ntransport = kafka\n").unwrap_err();
        assert!(err.to_string().contains("expected memory or nsq"));

        let err = parse("[compute]\nbackend = fpga\n").unwrap_err();
        assert!(err.to_string().contains("compute.backend"));

        assert!(parse("[request]\nunit = row\n").is_err());
        assert!(parse("[store]\npreview = maybe\n").is_err());
        assert!(parse("[request]\nmax_zoom = -1\n").is_err());
        assert!(parse("[broker]\nmax_message_size = 2TB\n").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("ZETA_TILE_PATH", "/data/tiles"),
            ("ZETA_NSQD", " nsqd.internal:4150 "),
            ("ZETA_NSQLOOKUP", ""),
        ]
        .into_iter()
        .collect();

        let mut config = ConfigFile::default();
        apply_env(&mut config, |name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.store.root, PathBuf::from("/data/tiles"));
        assert_eq!(config.broker.nsqd, "nsqd.internal:4150");
        // Empty values are ignored
        assert_eq!(config.broker.lookupd, ConfigFile::default().broker.lookupd);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("Yes"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("sure"), None);
    }

    #[test]
    fn test_expand_tilde() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/tiles"), home.join("tiles"));
        }
        assert_eq!(expand_tilde("/absolute/tiles"), PathBuf::from("/absolute/tiles"));
    }
}
