//! Parallel pixel kernel.
//!
//! The pixel buffer is cut into contiguous row-major chunks that rayon
//! spreads over its worker threads. Chunks are disjoint slices of the same
//! buffer, so no locking is needed and the result does not depend on the
//! chunk layout.

use super::backend::ComputeBackend;
use super::escape::{escape_iterations, EscapeConfig};
use super::{ComputeError, Iterations};
use num_complex::Complex64;
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Default number of chunks per hardware thread.
pub const DEFAULT_CHUNKS_PER_THREAD: usize = 2;

/// Pure CPU implementation of [`ComputeBackend`].
#[derive(Debug, Clone)]
pub struct ComputeKernel {
    escape: EscapeConfig,
    threads: usize,
    chunks_per_thread: usize,
}

impl ComputeKernel {
    /// Creates a kernel sized for rayon's worker threads.
    pub fn new(escape: EscapeConfig) -> Self {
        Self {
            escape,
            threads: rayon::current_num_threads().max(1),
            chunks_per_thread: DEFAULT_CHUNKS_PER_THREAD,
        }
    }

    /// Overrides the thread count the chunk layout is sized for.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Overrides the number of chunks handed to each thread.
    pub fn with_chunks_per_thread(mut self, chunks: usize) -> Self {
        self.chunks_per_thread = chunks.max(1);
        self
    }

    /// Stopping conditions used for every pixel.
    pub fn escape_config(&self) -> &EscapeConfig {
        &self.escape
    }

    /// Computes a `width × width` grid over `[min, max]`.
    ///
    /// Pixel `(x, y)` samples `min + (Re(span)·x/width, Im(span)·y/width)`
    /// and is stored at `y * width + x`. Returns `None` when `cancel` fires
    /// before every pixel is done.
    pub fn compute(
        &self,
        min: Complex64,
        max: Complex64,
        width: usize,
        cancel: &CancellationToken,
    ) -> Option<Vec<Iterations>> {
        let total = width * width;
        let mut data = vec![0 as Iterations; total];
        if total == 0 {
            return Some(data);
        }

        let chunks = (self.threads * self.chunks_per_thread).min(total);
        let chunk_len = total.div_ceil(chunks);
        let span = max - min;
        let scale = width as f64;
        let escape = &self.escape;

        debug!(
            width,
            chunks,
            chunk_len,
            min = %min,
            max = %max,
            "Computing grid"
        );

        data.par_chunks_mut(chunk_len)
            .enumerate()
            .for_each(|(chunk_index, chunk)| {
                let offset = chunk_index * chunk_len;
                for (i, pixel) in chunk.iter_mut().enumerate() {
                    if cancel.is_cancelled() {
                        trace!(chunk = chunk_index, "Chunk cancelled");
                        return;
                    }
                    let index = offset + i;
                    let u = (index % width) as f64 / scale;
                    let v = (index / width) as f64 / scale;
                    let s = min + Complex64::new(span.re * u, span.im * v);
                    *pixel = escape_iterations(s, escape);
                }
            });

        if cancel.is_cancelled() {
            return None;
        }
        Some(data)
    }
}

impl ComputeBackend for ComputeKernel {
    fn name(&self) -> &str {
        "cpu"
    }

    fn compute(
        &self,
        min: Complex64,
        max: Complex64,
        width: usize,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<Iterations>>, ComputeError> {
        Ok(ComputeKernel::compute(self, min, max, width, cancel))
    }
}
