//! Tile and patch buffers.
//!
//! [`TileData`] is the unit handed between roles: the generation role
//! produces it, the store role persists it. A [`Patch`] is computed as one
//! grid and split into its tiles before publishing.

mod data;
mod error;
mod patch;

pub use data::{Tile, TileData};
pub use error::TileError;
pub use patch::Patch;
