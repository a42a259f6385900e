//! hpcdemo - small parallel-computing demonstrations
//!
//! Two independent programs share one binary:
//!
//! - **Exchange**: a coordinator (rank 0) hands a task to every worker over a
//!   point-to-point channel and collects one result from each, in rank order.
//! - **Array pipeline**: a fixed-size thread pool initializes a large `f64`
//!   buffer, averages it, transforms it and averages it again.
//!
//! # Architecture
//!
//! - **exchange**: group formation, framed MessagePack messaging over TCP,
//!   the coordinator/worker protocol, and a local process launcher
//! - **pipeline**: rayon-backed stages with reproducible per-chunk seeding
//! - **config**: clap CLI layered over an optional TOML file
//! - **output**: JSON run summaries

pub mod config;
pub mod error;
pub mod exchange;
pub mod output;
pub mod pipeline;
pub mod util;

// Re-export commonly used types
pub use config::Config;
pub use error::{AllocationError, TransportError};

/// Result type used throughout hpcdemo
pub type Result<T> = anyhow::Result<T>;
