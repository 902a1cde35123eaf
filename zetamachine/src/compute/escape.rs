//! Escape-time iteration of the zeta approximation.

use super::zeta::zeta;
use super::{ComputeError, Iterations};
use num_complex::Complex64;

/// Default convergence threshold on the real part.
pub const DEFAULT_EPSILON: f64 = 1e-15;

/// Default magnitude at which a point counts as escaped.
pub const DEFAULT_ESCAPE_RADIUS: f64 = 1e4;

/// Default iteration cap.
pub const DEFAULT_MAX_ITERATIONS: u32 = 5000;

/// Largest smoothing bonus added to an escaped point.
const ESCAPE_BONUS: u32 = 2;

/// Stopping conditions for [`escape`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EscapeConfig {
    /// Stop once `|Re(z_new) − Re(z_old)|` drops to or below this.
    pub epsilon: f64,
    /// Stop once `|z|` reaches this.
    pub escape_radius: f64,
    /// Stop after this many applications of ζ.
    pub max_iterations: u32,
}

impl Default for EscapeConfig {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
            escape_radius: DEFAULT_ESCAPE_RADIUS,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl EscapeConfig {
    /// Largest count [`escape`] can return under this configuration.
    pub fn max_count(&self) -> u64 {
        u64::from(self.max_iterations) + u64::from(ESCAPE_BONUS)
    }

    /// Rejects configurations whose counts cannot be stored losslessly.
    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.max_count() > u64::from(Iterations::MAX) {
            return Err(ComputeError::IterationWidth {
                max_iterations: self.max_iterations,
                limit: u32::from(Iterations::MAX) - ESCAPE_BONUS,
            });
        }
        if !self.epsilon.is_finite() || self.epsilon < 0.0 {
            return Err(ComputeError::InvalidEscape(format!(
                "epsilon must be a non-negative number, got {}",
                self.epsilon
            )));
        }
        if !(self.escape_radius > 0.0) {
            return Err(ComputeError::InvalidEscape(format!(
                "escape radius must be positive, got {}",
                self.escape_radius
            )));
        }
        Ok(())
    }
}

/// Number of ζ applications before `s` converges, escapes or gives up.
///
/// Escaped points get a bonus of 1 when they leave through the left
/// half-plane and 2 otherwise, which separates the two basins in previews.
pub fn escape(s: Complex64, config: &EscapeConfig) -> u32 {
    let mut s = s;
    let mut z = Complex64::new(0.0, 0.0);
    let mut count = 0u32;
    let mut diff = 100.0_f64;
    let mut magnitude = 0.0_f64;

    while !magnitude.is_nan()
        && diff > config.epsilon
        && magnitude < config.escape_radius
        && count < config.max_iterations
    {
        z = zeta(s);
        diff = (z.re - s.re).abs();
        magnitude = z.norm();
        count += 1;
        s = z;
    }

    if !magnitude.is_nan() && magnitude >= config.escape_radius {
        count += if z.re < 0.0 { 1 } else { ESCAPE_BONUS };
    }

    count
}

/// [`escape`] narrowed to the storage width.
///
/// Saturates only if `config` was never validated.
#[inline]
pub fn escape_iterations(s: Complex64, config: &EscapeConfig) -> Iterations {
    Iterations::try_from(escape(s, config)).unwrap_or(Iterations::MAX)
}
