//! Shared utilities

pub mod affinity;
pub mod time;
