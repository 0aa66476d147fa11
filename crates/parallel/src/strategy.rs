//! Parallel processing strategies

use rayon::prelude::*;
use runnel_core::{Error, Result};

/// Processing mode for the routing sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    /// Single-threaded processing
    #[default]
    Sequential,
    /// Parallel processing using the global rayon pool
    Parallel,
    /// Parallel with specified number of threads
    ParallelWith(usize),
}

impl ProcessingMode {
    /// Whether work is spread over several threads
    pub fn is_parallel(&self) -> bool {
        !matches!(self, ProcessingMode::Sequential)
    }
}

/// Strategy for executing independent work items
pub trait ParallelStrategy {
    /// Map a function over items and collect results in item order.
    fn par_map<I, T, F>(&self, items: &[I], f: F) -> Result<Vec<T>>
    where
        I: Sync,
        T: Send,
        F: Fn(&I) -> T + Sync + Send;
}

impl ParallelStrategy for ProcessingMode {
    fn par_map<I, T, F>(&self, items: &[I], f: F) -> Result<Vec<T>>
    where
        I: Sync,
        T: Send,
        F: Fn(&I) -> T + Sync + Send,
    {
        match self {
            ProcessingMode::Sequential => Ok(items.iter().map(f).collect()),
            ProcessingMode::Parallel => Ok(items.par_iter().map(f).collect()),
            ProcessingMode::ParallelWith(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(*threads)
                    .build()
                    .map_err(|e| Error::Other(format!("failed to build thread pool: {}", e)))?;
                Ok(pool.install(|| items.par_iter().map(f).collect()))
            }
        }
    }
}

/// Get the number of available CPU cores
pub fn num_cpus() -> usize {
    rayon::current_num_threads()
}
