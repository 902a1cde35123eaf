//! Request deduplication with on-disk lease markers.
//!
//! Before publishing a generation request the request role takes a lease on
//! the tile: a zero-byte marker next to where the tile will be stored. While
//! the marker is younger than the maximum lease age the tile is not requested
//! again. The store role removes the marker once the tile is saved. A marker
//! left behind by a lost request simply expires.
//!
//! This is a best-effort guard for an at-least-once pipeline: duplicates are
//! rare, never harmful, and the tile store is the source of truth.

use crate::coord::{PatchAddress, TileAddress};
use crate::store::TileStore;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::{debug, trace};

/// Default maximum lease age (24 hours).
pub const DEFAULT_MAX_LEASE_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Lease manager errors.
#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("Lease I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LeaseError {
    fn io(path: &Path, source: io::Error) -> Self {
        LeaseError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Outcome of a lease check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseDecision {
    /// A fresh lease was taken; the tile should be generated
    Generate,
    /// The tile is already stored
    Exists,
    /// Another request holds a live lease of the given age
    Leased { age: Duration },
}

impl LeaseDecision {
    pub fn should_generate(&self) -> bool {
        matches!(self, LeaseDecision::Generate)
    }
}

/// Takes and releases lease markers in a [`TileStore`]'s tree.
#[derive(Debug, Clone)]
pub struct LeaseManager {
    store: TileStore,
    max_age: Duration,
}

impl LeaseManager {
    pub fn new(store: TileStore, max_age: Duration) -> Self {
        Self { store, max_age }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn store(&self) -> &TileStore {
        &self.store
    }

    /// Decides whether `address` should be requested, taking the lease when
    /// it should.
    ///
    /// - stored tile: any marker is stale and removed, [`LeaseDecision::Exists`]
    /// - marker younger than the max age: [`LeaseDecision::Leased`]
    /// - older marker: removed, then treated as absent
    /// - no marker: directories and marker created, [`LeaseDecision::Generate`]
    pub fn check(&self, address: &TileAddress) -> Result<LeaseDecision, LeaseError> {
        let marker = self.store.lease_path(address);

        if self.store.exists(address) {
            if remove_if_present(&marker)? {
                debug!(tile = %address, "Removed stale lease for stored tile");
            }
            return Ok(LeaseDecision::Exists);
        }

        if let Some(age) = marker_age(&marker)? {
            if age < self.max_age {
                trace!(tile = %address, age_secs = age.as_secs(), "Tile already leased");
                return Ok(LeaseDecision::Leased { age });
            }
            debug!(tile = %address, age_secs = age.as_secs(), "Lease expired, requesting again");
            remove_if_present(&marker)?;
        }

        let directory = self.store.directory(address);
        fs::create_dir_all(&directory).map_err(|e| LeaseError::io(&directory, e))?;

        match OpenOptions::new().write(true).create_new(true).open(&marker) {
            Ok(_) => Ok(LeaseDecision::Generate),
            // Lost a race with another requester
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Ok(LeaseDecision::Leased { age: Duration::ZERO })
            }
            Err(e) => Err(LeaseError::io(&marker, e)),
        }
    }

    /// `true` when the tile should be requested; the lease is then held.
    pub fn should_generate(&self, address: &TileAddress) -> Result<bool, LeaseError> {
        Ok(self.check(address)?.should_generate())
    }

    /// Checks every tile of a patch, taking leases on the missing ones.
    ///
    /// Returns `true` when at least one tile needed generating.
    pub fn should_generate_patch(&self, patch: &PatchAddress) -> Result<bool, LeaseError> {
        let mut missing = 0usize;
        for tile in patch.tiles() {
            if self.check(&tile)?.should_generate() {
                missing += 1;
            }
        }
        if missing > 0 {
            debug!(patch = %patch, missing, "Patch has missing tiles");
        }
        Ok(missing > 0)
    }

    /// Releases the lease on a tile. Returns whether a marker was removed.
    pub fn received(&self, address: &TileAddress) -> Result<bool, LeaseError> {
        remove_if_present(&self.store.lease_path(address))
    }
}

/// Age of a marker, or `None` when it does not exist.
///
/// A marker stamped in the future counts as brand new.
fn marker_age(path: &Path) -> Result<Option<Duration>, LeaseError> {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(LeaseError::io(path, e)),
    };
    let modified = metadata.modified().map_err(|e| LeaseError::io(path, e))?;
    Ok(Some(
        SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO),
    ))
}

fn remove_if_present(path: &Path) -> Result<bool, LeaseError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(LeaseError::io(path, e)),
    }
}
