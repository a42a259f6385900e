//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.
//! Every field has a default, so an empty TOML file is a valid configuration.

pub mod cli;
pub mod toml;

use crate::exchange::protocol::PAYLOAD_CAPACITY;
use crate::util::affinity::parse_cpu_list;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Complete run configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Exchange harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Participants in the group, coordinator included
    #[serde(default = "default_processes")]
    pub processes: usize,
    /// Rendezvous address the coordinator binds (port 0 = any free port)
    #[serde(default = "default_coordinator_addr")]
    pub coordinator_addr: String,
    /// Simulated coordinator work before tasks go out (milliseconds)
    #[serde(default = "default_coordinator_delay_ms")]
    pub coordinator_delay_ms: u64,
    /// Simulated worker computation (milliseconds)
    #[serde(default = "default_work_delay_ms")]
    pub work_delay_ms: u64,
    /// Upper bound on group formation (seconds)
    #[serde(default = "default_join_timeout_secs")]
    pub join_timeout_secs: u64,
    /// Upper bound on each receive (seconds); unset waits indefinitely
    #[serde(default)]
    pub receive_timeout_secs: Option<f64>,
    /// Receive buffer size in bytes, terminator included
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
}

fn default_processes() -> usize {
    4
}

fn default_coordinator_addr() -> String {
    "127.0.0.1:0".to_string()
}

fn default_coordinator_delay_ms() -> u64 {
    2000
}

fn default_work_delay_ms() -> u64 {
    1000
}

fn default_join_timeout_secs() -> u64 {
    30
}

fn default_max_message_len() -> usize {
    PAYLOAD_CAPACITY
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            processes: default_processes(),
            coordinator_addr: default_coordinator_addr(),
            coordinator_delay_ms: default_coordinator_delay_ms(),
            work_delay_ms: default_work_delay_ms(),
            join_timeout_secs: default_join_timeout_secs(),
            receive_timeout_secs: None,
            max_message_len: default_max_message_len(),
        }
    }
}

/// Array pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of `f64` elements in the buffer
    #[serde(default = "default_array_size")]
    pub array_size: usize,
    /// Pool thread count, fixed for the whole run
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Transform scale factor
    #[serde(default = "default_factor")]
    pub factor: f64,
    /// Base seed for initialization
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Elements per work unit (also one random stream per chunk)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// CPU cores to pin pool threads to (e.g. "0,2-4")
    #[serde(default)]
    pub cpu_cores: Option<String>,
}

fn default_array_size() -> usize {
    100_000_000
}

fn default_threads() -> usize {
    8
}

fn default_factor() -> f64 {
    2.0
}

fn default_seed() -> u64 {
    0x5eed
}

fn default_chunk_size() -> usize {
    65_536
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            array_size: default_array_size(),
            threads: default_threads(),
            factor: default_factor(),
            seed: default_seed(),
            chunk_size: default_chunk_size(),
            cpu_cores: None,
        }
    }
}

/// Report output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Write the run summary as JSON to this path
    #[serde(default)]
    pub json_output: Option<PathBuf>,
    /// Pretty-print the JSON summary
    #[serde(default = "default_pretty_json")]
    pub pretty_json: bool,
}

fn default_pretty_json() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            json_output: None,
            pretty_json: default_pretty_json(),
        }
    }
}

// Validation methods

impl Config {
    /// Validate the complete configuration
    pub fn validate(&self) -> Result<(), String> {
        self.exchange.validate()?;
        self.pipeline.validate()?;
        Ok(())
    }
}

impl ExchangeConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.processes == 0 {
            return Err("processes must be at least 1".to_string());
        }
        if self.coordinator_addr.trim().is_empty() {
            return Err("coordinator_addr must not be empty".to_string());
        }
        if self.join_timeout_secs == 0 {
            return Err("join_timeout_secs must be greater than 0".to_string());
        }
        if let Some(secs) = self.receive_timeout_secs {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(format!(
                    "receive_timeout_secs must be a positive number, got {}",
                    secs
                ));
            }
            if Duration::try_from_secs_f64(secs).is_err() {
                return Err(format!("receive_timeout_secs {} is too large", secs));
            }
        }
        if self.max_message_len == 0 || self.max_message_len > PAYLOAD_CAPACITY {
            return Err(format!(
                "max_message_len must be 1-{}, got {}",
                PAYLOAD_CAPACITY, self.max_message_len
            ));
        }
        Ok(())
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.array_size == 0 {
            return Err("array_size must be greater than 0".to_string());
        }
        if self.threads == 0 {
            return Err("threads must be greater than 0".to_string());
        }
        if self.chunk_size == 0 {
            return Err("chunk_size must be greater than 0".to_string());
        }
        if !self.factor.is_finite() {
            return Err(format!("factor must be finite, got {}", self.factor));
        }
        if let Some(ref cores) = self.cpu_cores {
            parse_cpu_list(cores).map_err(|e| format!("cpu_cores: {:#}", e))?;
        }
        Ok(())
    }
}

impl fmt::Display for ExchangeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processes, coordinator {}, work delay {}ms",
            self.processes, self.coordinator_addr, self.work_delay_ms
        )?;
        if let Some(secs) = self.receive_timeout_secs {
            write!(f, ", receive timeout {}s", secs)?;
        }
        Ok(())
    }
}

impl fmt::Display for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} elements, {} threads, factor {}, seed {}",
            self.array_size, self.threads, self.factor, self.seed
        )?;
        if let Some(ref cores) = self.cpu_cores {
            write!(f, ", cores {}", cores)?;
        }
        Ok(())
    }
}
