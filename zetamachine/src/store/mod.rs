//! Durable tile storage.
//!
//! Tiles live in a deterministic hierarchy under a root directory:
//!
//! ```text
//! {root}/{zoom}/{y}/{zoom}.{y}.{x}.dat.gz     tile payload
//! {root}/{zoom}/{y}/{zoom}.{y}.{x}.png        optional preview
//! {root}/{zoom}/{y}/{zoom}.{y}.{x}.lease      lease marker
//! ```
//!
//! The payload is the tile's counts as little-endian `u16`, gzip-compressed.
//! Every write goes to a uniquely named temp file in the same directory and
//! is renamed into place, so readers never observe a partial tile.

pub mod preview;

use crate::coord::TileAddress;
use crate::tile::{Tile, TileData, TileError};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, warn};

/// Extension of tile payload files.
pub const TILE_EXTENSION: &str = "dat.gz";

/// Extension of preview images.
pub const PREVIEW_EXTENSION: &str = "png";

/// Extension of lease markers.
pub const LEASE_EXTENSION: &str = "lease";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem operation failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// No payload stored for the tile
    #[error("Tile {0} is not stored")]
    NotFound(TileAddress),

    /// Payload could not be decoded
    #[error("Corrupt tile payload at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: TileError,
    },

    /// Preview rendering failed
    #[error("Preview encoding failed: {0}")]
    Preview(String),
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Filesystem tile store.
#[derive(Debug, Clone)]
pub struct TileStore {
    root: PathBuf,
    preview: bool,
}

impl TileStore {
    /// Creates a store rooted at `root`. Previews are off by default.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            preview: false,
        }
    }

    /// Enables or disables PNG previews next to each saved tile.
    pub fn with_preview(mut self, enabled: bool) -> Self {
        self.preview = enabled;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn preview_enabled(&self) -> bool {
        self.preview
    }

    /// Directory holding every file of a tile row: `{root}/{zoom}/{y}`.
    pub fn directory(&self, address: &TileAddress) -> PathBuf {
        self.root
            .join(address.zoom.to_string())
            .join(address.y.to_string())
    }

    /// `{root}/{zoom}/{y}/{zoom}.{y}.{x}.{extension}`
    pub fn path_for(&self, address: &TileAddress, extension: &str) -> PathBuf {
        self.directory(address).join(format!(
            "{}.{}.{}.{}",
            address.zoom, address.y, address.x, extension
        ))
    }

    pub fn tile_path(&self, address: &TileAddress) -> PathBuf {
        self.path_for(address, TILE_EXTENSION)
    }

    pub fn preview_path(&self, address: &TileAddress) -> PathBuf {
        self.path_for(address, PREVIEW_EXTENSION)
    }

    pub fn lease_path(&self, address: &TileAddress) -> PathBuf {
        self.path_for(address, LEASE_EXTENSION)
    }

    /// Whether a payload is stored for the tile.
    pub fn exists(&self, address: &TileAddress) -> bool {
        self.tile_path(address).is_file()
    }

    /// Persists a tile, creating directories as needed.
    ///
    /// A failed preview is logged and does not fail the save.
    pub fn save(&self, tile: &Tile) -> Result<PathBuf, StoreError> {
        let path = self.tile_path(&tile.address);
        let directory = self.directory(&tile.address);
        fs::create_dir_all(&directory).map_err(|e| StoreError::io(&directory, e))?;

        let payload = compress(&tile.data.to_le_bytes()).map_err(|e| StoreError::io(&path, e))?;
        write_atomic(&path, &payload)?;

        debug!(
            tile = %tile.address,
            bytes = payload.len(),
            path = %path.display(),
            "Tile saved"
        );

        if self.preview {
            if let Err(e) = self.save_preview(&tile.address, &tile.data) {
                warn!(tile = %tile.address, error = %e, "Failed to write preview");
            }
        }

        Ok(path)
    }

    /// Writes the PNG preview for a tile.
    pub fn save_preview(&self, address: &TileAddress, data: &TileData) -> Result<PathBuf, StoreError> {
        let path = self.preview_path(address);
        let directory = self.directory(address);
        fs::create_dir_all(&directory).map_err(|e| StoreError::io(&directory, e))?;

        let png = preview::encode_png(data)?;
        write_atomic(&path, &png)?;
        Ok(path)
    }

    /// Reads a stored tile back.
    pub fn load(&self, address: &TileAddress) -> Result<TileData, StoreError> {
        let path = self.tile_path(address);
        let compressed = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(*address))
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        let mut bytes = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_end(&mut bytes)
            .map_err(|e| StoreError::io(&path, e))?;

        TileData::from_le_bytes(&bytes).map_err(|source| StoreError::Corrupt { path, source })
    }
}

fn compress(bytes: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 4), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

/// Writes `bytes` to a unique sibling temp file and renames it over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let temp_path = temp_path(path);
    if let Err(e) = fs::write(&temp_path, bytes) {
        let _ = fs::remove_file(&temp_path);
        return Err(StoreError::io(&temp_path, e));
    }
    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(StoreError::io(path, e));
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let unique = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{}.{}.{}.tmp", name, std::process::id(), unique))
}
