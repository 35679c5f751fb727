//! Parallel processing strategies

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use std::fmt;

/// Smallest run of pixels handed to one worker
pub const DEFAULT_MIN_CHUNK: usize = 256;

/// Processing mode for a routing sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    /// Single-threaded processing
    Sequential,
    /// Parallel processing using all available cores
    #[default]
    Parallel,
    /// Parallel with a dedicated pool of the given width
    ParallelWith(usize),
}

impl ProcessingMode {
    /// Map a configured worker count onto a mode.
    ///
    /// `0` means "all available cores", `1` runs on the calling thread.
    pub fn from_workers(workers: usize) -> Self {
        match workers {
            0 => ProcessingMode::Parallel,
            1 => ProcessingMode::Sequential,
            n => ProcessingMode::ParallelWith(n),
        }
    }

    /// Number of workers this mode runs with (always at least 1)
    pub fn workers(&self) -> usize {
        match self {
            ProcessingMode::Sequential => 1,
            ProcessingMode::Parallel => available_workers(),
            ProcessingMode::ParallelWith(n) => (*n).max(1),
        }
    }
}

/// Strategy for mapping one batch of independent items
pub trait ParallelStrategy {
    /// Map `f` over `items`, returning results in input order.
    ///
    /// Returns only after every item has been processed, which is the
    /// barrier between consecutive batches.
    fn map_batch<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send;
}

/// Failure to start a dedicated worker pool
#[derive(Debug, Clone)]
pub struct PoolError(String);

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to build worker pool: {}", self.0)
    }
}

impl std::error::Error for PoolError {}

/// Executes batches according to a [`ProcessingMode`].
///
/// A dedicated pool is built once, at construction, so the per-substep hot
/// path never pays for thread start-up.
pub struct BatchExecutor {
    mode: ProcessingMode,
    min_chunk: usize,
    #[cfg(feature = "parallel")]
    pool: Option<rayon::ThreadPool>,
}

impl BatchExecutor {
    pub fn new(mode: ProcessingMode) -> Result<Self, PoolError> {
        #[cfg(feature = "parallel")]
        let pool = match mode {
            ProcessingMode::ParallelWith(n) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n.max(1))
                    .build()
                    .map_err(|e| PoolError(e.to_string()))?,
            ),
            _ => None,
        };

        Ok(Self {
            mode,
            min_chunk: DEFAULT_MIN_CHUNK,
            #[cfg(feature = "parallel")]
            pool,
        })
    }

    /// Executor for a configured worker count (see [`ProcessingMode::from_workers`])
    pub fn with_workers(workers: usize) -> Result<Self, PoolError> {
        Self::new(ProcessingMode::from_workers(workers))
    }

    /// Override the smallest chunk handed to one worker
    pub fn with_min_chunk(mut self, min_chunk: usize) -> Self {
        self.min_chunk = min_chunk.max(1);
        self
    }

    pub fn mode(&self) -> ProcessingMode {
        self.mode
    }

    pub fn workers(&self) -> usize {
        self.mode.workers()
    }
}

impl fmt::Debug for BatchExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchExecutor")
            .field("mode", &self.mode)
            .field("min_chunk", &self.min_chunk)
            .finish()
    }
}

impl ParallelStrategy for BatchExecutor {
    fn map_batch<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        #[cfg(feature = "parallel")]
        {
            let min_len = self.min_chunk;
            match (self.mode, &self.pool) {
                (ProcessingMode::Sequential, _) => items.iter().map(f).collect(),
                (_, Some(pool)) => {
                    pool.install(|| items.par_iter().with_min_len(min_len).map(f).collect())
                }
                _ => items.par_iter().with_min_len(min_len).map(f).collect(),
            }
        }

        #[cfg(not(feature = "parallel"))]
        {
            items.iter().map(f).collect()
        }
    }
}

/// Get the number of available CPU cores
pub fn available_workers() -> usize {
    #[cfg(feature = "parallel")]
    {
        rayon::current_num_threads()
    }

    #[cfg(not(feature = "parallel"))]
    {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}
