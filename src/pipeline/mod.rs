//! Array pipeline
//!
//! Fixed-thread-count data-parallel stages over one large `f64` buffer:
//! initialize, reduce-to-average, transform. A stage never starts before the
//! previous one has finished on every thread.

pub mod buffer;
pub mod pool;
pub mod runner;
pub mod stages;

pub use buffer::NumericBuffer;
pub use pool::{ThreadPlacement, WorkPool};
pub use runner::{run_pipeline, run_stages, PipelineReport, StageTiming};
pub use stages::{compute_average, initialize, transform};
