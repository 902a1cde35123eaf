//! zetamachine - distributed zeta-fractal tile generation
//!
//! Renders the escape behaviour of iterated Riemann zeta approximations as a
//! quad-tree of image tiles, computed by a fleet of workers that coordinate
//! through a message broker.
//!
//! ```text
//! request ──request-tile──► generate ──store-tile──► store ──► {root}/{zoom}/{y}/...
//! ```
//!
//! # Layout
//!
//! - [`coord`]: tile and patch addresses and their complex-plane rectangles
//! - [`compute`]: ζ approximation, escape counting, the parallel kernel
//! - [`tile`]: tile buffers and patch splitting
//! - [`store`], [`lease`]: durable tiles and request deduplication
//! - [`broker`], [`messages`], [`worker`]: transport and consumption
//! - [`roles`]: the request, generate and store services
//! - [`config`], [`logging`]: ambient setup for the binary
//!
//! Computing a single tile needs only the first three:
//!
//! ```
//! use zetamachine::compute::{ComputeKernel, EscapeConfig};
//! use zetamachine::coord::TileAddress;
//! use tokio_util::sync::CancellationToken;
//!
//! let tile = TileAddress::new(3, 1, -2).unwrap();
//! let kernel = ComputeKernel::new(EscapeConfig { max_iterations: 50, ..Default::default() });
//! let counts = kernel
//!     .compute(tile.min(), tile.max(), 2, &CancellationToken::new())
//!     .unwrap();
//! assert_eq!(counts.len(), 4);
//! ```

pub mod broker;
pub mod compute;
pub mod config;
pub mod coord;
pub mod lease;
pub mod logging;
pub mod messages;
pub mod roles;
pub mod store;
pub mod tile;
pub mod worker;

/// Version of the zetamachine library and CLI.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
