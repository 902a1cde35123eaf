//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! # Command Modules
//!
//! - [`config`] - Configuration management (path, show, init)
//! - [`generate`] - Generation role: compute requested tiles
//! - [`render`] - Compute one tile locally and write its preview
//! - [`request`] - Request role: sweep zoom levels for missing tiles
//! - [`seed`] - All three roles in one process
//! - [`store`] - Store role: persist computed tiles

pub mod common;
pub mod config;
pub mod generate;
pub mod render;
pub mod request;
pub mod seed;
pub mod store;
