//! Run summaries
//!
//! Human-readable progress goes to stdout as each mode runs. This module
//! covers the machine-readable side: one JSON document per run.

pub mod json;

pub use json::{write_json_output, RunReport, RunSummary};
