//! Fixed-size worker pool shared by every pipeline stage
//!
//! Wraps a rayon `ThreadPool` whose thread count is set once at
//! construction. Threads are optionally pinned to CPU cores as they start.

use crate::util::affinity::{current_cpu, pin_current_thread};
use crate::Result;
use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;

/// Where one pool thread was running when asked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThreadPlacement {
    /// Index within the pool (0-based)
    pub thread: usize,
    /// CPU core, when the platform reports it
    pub cpu: Option<usize>,
}

/// Fixed-size thread pool for the array pipeline
pub struct WorkPool {
    pool: rayon::ThreadPool,
    threads: usize,
}

impl WorkPool {
    /// Build a pool of `threads` threads
    ///
    /// With `cpu_cores`, thread `i` is pinned to `cpu_cores[i % len]`.
    /// Pinning failures are logged, not fatal.
    pub fn new(threads: usize, cpu_cores: Option<Vec<usize>>) -> Result<Self> {
        if threads == 0 {
            anyhow::bail!("Thread count must be greater than 0");
        }

        let mut builder = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("pipeline-{}", index));

        if let Some(cores) = cpu_cores.filter(|cores| !cores.is_empty()) {
            let cores = Arc::new(cores);
            builder = builder.start_handler(move |index| {
                let core = cores[index % cores.len()];
                match pin_current_thread(core) {
                    Ok(()) => log::debug!("Pipeline thread {} pinned to core {}", index, core),
                    Err(e) => log::warn!("Pipeline thread {}: {:#}", index, e),
                }
            });
        }

        let pool = builder
            .build()
            .context("Failed to build pipeline thread pool")?;

        Ok(Self { pool, threads })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Run `op` inside the pool; parallel iterators in `op` use its threads
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }

    /// Ask every pool thread where it is running, sorted by thread index
    pub fn thread_report(&self) -> Vec<ThreadPlacement> {
        let mut placements = self.pool.broadcast(|ctx| ThreadPlacement {
            thread: ctx.index(),
            cpu: current_cpu(),
        });
        placements.sort_by_key(|p| p.thread);
        placements
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_pool_thread_count() {
        let pool = WorkPool::new(3, None).unwrap();
        assert_eq!(pool.threads(), 3);
        assert_eq!(pool.install(rayon::current_num_threads), 3);
    }

    #[test]
    fn test_zero_threads_rejected() {
        assert!(WorkPool::new(0, None).is_err());
    }

    #[test]
    fn test_thread_report_covers_every_thread() {
        let pool = WorkPool::new(4, None).unwrap();
        let report = pool.thread_report();
        let threads: Vec<usize> = report.iter().map(|p| p.thread).collect();
        assert_eq!(threads, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_install_runs_parallel_work() {
        let pool = WorkPool::new(2, None).unwrap();
        let sum: u64 = pool.install(|| (1..=1000u64).into_par_iter().sum());
        assert_eq!(sum, 500_500);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_pinned_pool_still_runs() {
        let pool = WorkPool::new(2, Some(vec![0])).unwrap();
        let report = pool.thread_report();
        assert_eq!(report.len(), 2);
    }
}
