//! Compute backend selection.
//!
//! The generation role holds an `Arc<dyn ComputeBackend>` and never knows
//! whether pixels come from [`ComputeKernel`] or from a linked accelerator.

use super::escape::EscapeConfig;
use super::kernel::ComputeKernel;
use super::{ComputeError, Iterations};
use num_complex::Complex64;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Turns a rectangle of the complex plane into a `width × width` grid.
pub trait ComputeBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Computes the grid, or `Ok(None)` when `cancel` fired first.
    fn compute(
        &self,
        min: Complex64,
        max: Complex64,
        width: usize,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<Iterations>>, ComputeError>;
}

/// Signature of an accelerator entry point:
/// `(min_real, max_real, min_imag, max_imag, width) -> counts`.
pub type AcceleratorFn = dyn Fn(f64, f64, f64, f64, usize) -> Vec<u32> + Send + Sync;

/// Backend delegating to an external, non-cancellable generator.
///
/// Cancellation is honoured before and after the call only.
#[derive(Clone)]
pub struct ExternalAccelerator {
    name: String,
    generate: Arc<AcceleratorFn>,
}

impl ExternalAccelerator {
    /// Wraps a generator function.
    pub fn new<F>(name: impl Into<String>, generate: F) -> Self
    where
        F: Fn(f64, f64, f64, f64, usize) -> Vec<u32> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            generate: Arc::new(generate),
        }
    }

    /// The accelerator linked into this binary through the `cuda` feature.
    #[cfg(feature = "cuda")]
    pub fn linked() -> Self {
        Self::new("cuda", ffi::generate)
    }
}

impl fmt::Debug for ExternalAccelerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalAccelerator")
            .field("name", &self.name)
            .finish()
    }
}

impl ComputeBackend for ExternalAccelerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(
        &self,
        min: Complex64,
        max: Complex64,
        width: usize,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<Iterations>>, ComputeError> {
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let raw = (self.generate)(min.re, max.re, min.im, max.im, width);
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let expected = width * width;
        if raw.len() != expected {
            return Err(ComputeError::AcceleratorOutput {
                expected,
                actual: raw.len(),
            });
        }

        raw.into_iter()
            .map(|count| Iterations::try_from(count).map_err(|_| ComputeError::IterationOverflow(count)))
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }
}

#[cfg(feature = "cuda")]
mod ffi {
    #[link(name = "zm")]
    extern "C" {
        #[link_name = "generate"]
        fn zm_generate(
            min_real: f64,
            max_real: f64,
            min_imag: f64,
            max_imag: f64,
            width: u32,
            out: *mut u32,
        );
    }

    pub(super) fn generate(
        min_real: f64,
        max_real: f64,
        min_imag: f64,
        max_imag: f64,
        width: usize,
    ) -> Vec<u32> {
        let mut out = vec![0u32; width * width];
        // SAFETY: `out` holds width² elements, the size the generator fills.
        unsafe {
            zm_generate(
                min_real,
                max_real,
                min_imag,
                max_imag,
                width as u32,
                out.as_mut_ptr(),
            );
        }
        out
    }
}

/// Which backend a process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// [`ComputeKernel`]
    #[default]
    Cpu,
    /// [`ExternalAccelerator::linked`]
    Accelerator,
}

impl BackendKind {
    /// Whether this backend can be built in the current binary.
    pub fn is_available(&self) -> bool {
        match self {
            BackendKind::Cpu => true,
            BackendKind::Accelerator => cfg!(feature = "cuda"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Cpu => "cpu",
            BackendKind::Accelerator => "accelerator",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(BackendKind::Cpu),
            "accelerator" | "cuda" | "gpu" => Ok(BackendKind::Accelerator),
            other => Err(format!("unknown backend '{}' (expected cpu or accelerator)", other)),
        }
    }
}

/// Builds the backend selected by configuration.
pub fn build_backend(
    kind: BackendKind,
    escape: EscapeConfig,
    chunks_per_thread: usize,
) -> Result<Arc<dyn ComputeBackend>, ComputeError> {
    escape.validate()?;
    match kind {
        BackendKind::Cpu => Ok(Arc::new(
            ComputeKernel::new(escape).with_chunks_per_thread(chunks_per_thread),
        )),
        #[cfg(feature = "cuda")]
        BackendKind::Accelerator => Ok(Arc::new(ExternalAccelerator::linked())),
        #[cfg(not(feature = "cuda"))]
        BackendKind::Accelerator => Err(ComputeError::AcceleratorUnavailable),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake(counts: Vec<u32>) -> ExternalAccelerator {
        ExternalAccelerator::new("fake", move |_, _, _, _, _| counts.clone())
    }

    #[test]
    fn test_accelerator_passes_rectangle() {
        let accel = ExternalAccelerator::new("probe", |min_re, max_re, min_im, max_im, width| {
            assert_eq!((min_re, max_re, min_im, max_im), (-1.0, 3.0, -2.0, 2.0));
            vec![7; width * width]
        });
        let data = accel
            .compute(
                Complex64::new(-1.0, -2.0),
                Complex64::new(3.0, 2.0),
                3,
                &CancellationToken::new(),
            )
            .unwrap()
            .unwrap();
        assert_eq!(data, vec![7; 9]);
    }

    #[test]
    fn test_accelerator_wrong_length() {
        let result = fake(vec![1, 2, 3]).compute(
            Complex64::new(0.0, 0.0),
            Complex64::new(1.0, 1.0),
            2,
            &CancellationToken::new(),
        );
        assert!(matches!(
            result,
            Err(ComputeError::AcceleratorOutput {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_accelerator_overflow() {
        let result = fake(vec![0, 70_000, 1, 2]).compute(
            Complex64::new(0.0, 0.0),
            Complex64::new(1.0, 1.0),
            2,
            &CancellationToken::new(),
        );
        assert!(matches!(result, Err(ComputeError::IterationOverflow(70_000))));
    }

    #[test]
    fn test_accelerator_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = fake(vec![0; 4])
            .compute(Complex64::new(0.0, 0.0), Complex64::new(1.0, 1.0), 2, &cancel)
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("cpu".parse::<BackendKind>().unwrap(), BackendKind::Cpu);
        assert_eq!(" CUDA ".parse::<BackendKind>().unwrap(), BackendKind::Accelerator);
        assert!("abacus".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_build_cpu_backend() {
        let backend = build_backend(BackendKind::Cpu, EscapeConfig::default(), 2).unwrap();
        assert_eq!(backend.name(), "cpu");
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_accelerator_unavailable_without_feature() {
        assert!(!BackendKind::Accelerator.is_available());
        assert!(matches!(
            build_backend(BackendKind::Accelerator, EscapeConfig::default(), 2),
            Err(ComputeError::AcceleratorUnavailable)
        ));
    }

    #[test]
    fn test_build_rejects_narrow_iterations() {
        let escape = EscapeConfig {
            max_iterations: 70_000,
            ..Default::default()
        };
        assert!(matches!(
            build_backend(BackendKind::Cpu, escape, 2),
            Err(ComputeError::IterationWidth { .. })
        ));
    }
}
