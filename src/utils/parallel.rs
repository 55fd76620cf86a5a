//! # Parallelism Utilities (CPU Threading)
//!
//! Provides the [`ExecutionContext`] handed to every numeric kernel. It decides
//! whether a reduction runs on a `rayon` pool (the global one or a dedicated
//! pool with a fixed number of threads) or sequentially on the caller's thread.
//!
//! Kernels only parallelize *within* a call: each call returns after all of its
//! work has finished, so an epoch never overlaps with the next one.

use crate::tensor::TensorError;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;

/// Vectors shorter than this are reduced sequentially; splitting them across
/// threads costs more than it saves.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 4096;

#[derive(Clone, Debug)]
enum Backend {
    Sequential,
    Global,
    Dedicated(Arc<ThreadPool>),
}

/// Execution context for numeric kernels.
///
/// Cheap to clone: dedicated pools are shared behind an `Arc`.
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    backend: Backend,
    parallel_threshold: usize,
}

impl ExecutionContext {
    /// Runs every kernel on the calling thread.
    pub fn sequential() -> Self {
        ExecutionContext {
            backend: Backend::Sequential,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }

    /// Uses rayon's global thread pool.
    pub fn global() -> Self {
        ExecutionContext {
            backend: Backend::Global,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }

    /// Builds a dedicated pool with `threads` workers.
    ///
    /// # Errors
    /// Returns `TensorError::Generic` if `threads` is zero or the pool cannot be spawned.
    pub fn with_threads(threads: usize) -> Result<Self, TensorError> {
        if threads == 0 {
            return Err(TensorError::Generic(
                "Execution context needs at least one thread".to_string(),
            ));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("rtrain-worker-{}", i))
            .build()
            .map_err(|e| TensorError::Generic(format!("Could not build thread pool: {}", e)))?;

        Ok(ExecutionContext {
            backend: Backend::Dedicated(Arc::new(pool)),
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        })
    }

    /// Overrides the minimum length at which kernels go parallel.
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold.max(1);
        self
    }

    /// Number of worker threads kernels may use.
    pub fn threads(&self) -> usize {
        match &self.backend {
            Backend::Sequential => 1,
            Backend::Global => rayon::current_num_threads(),
            Backend::Dedicated(pool) => pool.current_num_threads(),
        }
    }

    /// True if a kernel over `len` elements should be split across threads.
    pub fn is_parallel_for(&self, len: usize) -> bool {
        !matches!(self.backend, Backend::Sequential) && len >= self.parallel_threshold
    }

    /// Runs `op` inside this context's pool (or inline for the sequential and
    /// global backends) and blocks until it completes.
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        match &self.backend {
            Backend::Dedicated(pool) => pool.install(op),
            Backend::Sequential | Backend::Global => op(),
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        ExecutionContext::global()
    }
}
