//! Message envelopes exchanged between roles.
//!
//! Bodies are JSON. A request names either a single tile or a whole patch;
//! a result always carries one tile.
//!
//! ```text
//! request-tile  {"kind":"tile","address":{"zoom":0,"x":0,"y":0}}
//! store-tile    {"address":{"zoom":0,"x":0,"y":0},"data":{"width":256,"counts":[...]}}
//! tile-errors   original request body, verbatim
//! ```

use crate::coord::{CoordError, PatchAddress, TileAddress, MAX_ZOOM};
use crate::tile::{Tile, TileData};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Topic carrying generation requests.
pub const REQUEST_TOPIC: &str = "request-tile";

/// Topic carrying computed tiles.
pub const RESULT_TOPIC: &str = "store-tile";

/// Dead-letter topic for requests whose results cannot be published.
pub const ERROR_TOPIC: &str = "tile-errors";

/// Channel the generation role consumes requests on.
pub const GENERATE_CHANNEL: &str = "generate";

/// Channel the store role consumes results on.
pub const STORE_CHANNEL: &str = "store";

/// Envelope errors.
#[derive(Debug, Error)]
pub enum MessageError {
    /// Zero-length body
    #[error("Empty message body")]
    Empty,

    /// Body is not valid JSON for the expected envelope
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Envelope names an address outside the grid
    #[error("Invalid address in message: {0}")]
    InvalidAddress(#[from] CoordError),
}

/// Request to generate a tile or a patch of tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerateRequest {
    Tile { address: TileAddress },
    Patch { address: PatchAddress },
}

impl GenerateRequest {
    pub fn tile(address: TileAddress) -> Self {
        GenerateRequest::Tile { address }
    }

    pub fn patch(address: PatchAddress) -> Self {
        GenerateRequest::Patch { address }
    }

    pub fn zoom(&self) -> u8 {
        match self {
            GenerateRequest::Tile { address } => address.zoom,
            GenerateRequest::Patch { address } => address.zoom,
        }
    }

    fn validate(&self) -> Result<(), CoordError> {
        match self.zoom() {
            zoom if zoom > MAX_ZOOM => Err(CoordError::InvalidZoom(zoom)),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for GenerateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerateRequest::Tile { address } => write!(f, "tile {}", address),
            GenerateRequest::Patch { address } => write!(f, "{}", address),
        }
    }
}

/// A computed tile on its way to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateResult {
    pub address: TileAddress,
    pub data: TileData,
}

impl From<Tile> for GenerateResult {
    fn from(tile: Tile) -> Self {
        Self {
            address: tile.address,
            data: tile.data,
        }
    }
}

impl From<GenerateResult> for Tile {
    fn from(result: GenerateResult) -> Self {
        Tile::new(result.address, result.data)
    }
}

/// Serializes an envelope.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, MessageError> {
    Ok(serde_json::to_vec(message)?)
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, MessageError> {
    if body.is_empty() {
        return Err(MessageError::Empty);
    }
    Ok(serde_json::from_slice(body)?)
}

/// Parses and validates a request body.
pub fn decode_request(body: &[u8]) -> Result<GenerateRequest, MessageError> {
    let request: GenerateRequest = decode(body)?;
    request.validate()?;
    Ok(request)
}

/// Parses and validates a result body.
pub fn decode_result(body: &[u8]) -> Result<GenerateResult, MessageError> {
    let result: GenerateResult = decode(body)?;
    if result.address.zoom > MAX_ZOOM {
        return Err(CoordError::InvalidZoom(result.address.zoom).into());
    }
    Ok(result)
}
