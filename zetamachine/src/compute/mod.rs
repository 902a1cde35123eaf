//! Numerical compute
//!
//! Turns rectangles of the complex plane into grids of escape counts by
//! iterating an approximation of the Riemann zeta function.

pub mod backend;
pub mod escape;
pub mod kernel;
pub mod zeta;

pub use backend::{build_backend, AcceleratorFn, BackendKind, ComputeBackend, ExternalAccelerator};
pub use escape::{escape, escape_iterations, EscapeConfig};
pub use kernel::ComputeKernel;

use thiserror::Error;

/// Storage type of a single pixel's escape count.
pub type Iterations = u16;

/// Errors raised while configuring or running a compute backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComputeError {
    /// `max_iterations` plus escape smoothing does not fit [`Iterations`]
    #[error("max_iterations {max_iterations} does not fit the 16-bit iteration store (limit {limit})")]
    IterationWidth { max_iterations: u32, limit: u32 },

    /// Epsilon or escape radius unusable
    #[error("Invalid escape configuration: {0}")]
    InvalidEscape(String),

    /// Accelerator backend requested but not linked
    #[error("Accelerator backend is not available in this build (enable the `cuda` feature)")]
    AcceleratorUnavailable,

    /// Accelerator returned a grid of the wrong size
    #[error("Accelerator returned {actual} values, expected {expected}")]
    AcceleratorOutput { expected: usize, actual: usize },

    /// Accelerator returned a count wider than [`Iterations`]
    #[error("Accelerator returned iteration count {0}, which does not fit 16 bits")]
    IterationOverflow(u32),
}
