//! TOML configuration file parsing

use super::*;
use crate::config::cli::Cli;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<Config> {
    let config: Config = ::toml::from_str(contents)
        .context("Failed to parse TOML configuration")?;

    Ok(config)
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
pub fn merge_cli_with_config(cli: &Cli, mut config: Config) -> Result<Config> {
    // Exchange settings
    if let Some(processes) = cli.processes {
        config.exchange.processes = processes;
    }
    if let Some(ms) = cli.coordinator_delay_ms {
        config.exchange.coordinator_delay_ms = ms;
    }
    if let Some(ms) = cli.work_delay_ms {
        config.exchange.work_delay_ms = ms;
    }
    if let Some(secs) = cli.join_timeout_secs {
        config.exchange.join_timeout_secs = secs;
    }
    if let Some(secs) = cli.receive_timeout_secs {
        config.exchange.receive_timeout_secs = Some(secs);
    }

    // Participants rendezvous at the address they were handed
    if let Some(ref coordinator) = cli.coordinator {
        config.exchange.coordinator_addr = coordinator.clone();
    }
    if let Some(size) = cli.size {
        config.exchange.processes = size;
    }

    // Pipeline settings
    if let Some(threads) = cli.threads {
        config.pipeline.threads = threads;
    }
    if let Some(array_size) = cli.array_size {
        config.pipeline.array_size = array_size;
    }
    if let Some(factor) = cli.factor {
        config.pipeline.factor = factor;
    }
    if let Some(seed) = cli.seed {
        config.pipeline.seed = seed;
    }
    if let Some(chunk_size) = cli.chunk_size {
        config.pipeline.chunk_size = chunk_size;
    }
    if let Some(ref cores) = cli.cpu_cores {
        config.pipeline.cpu_cores = Some(cores.clone());
    }

    // Output
    if let Some(ref path) = cli.json_output {
        config.output.json_output = Some(path.clone());
    }

    Ok(config)
}

/// Build the effective configuration: file (if any), then CLI overrides, then validation
pub fn load_config(cli: &Cli) -> Result<Config> {
    let config = match cli.config {
        Some(ref path) => parse_toml_file(path)?,
        None => Config::default(),
    };

    let config = merge_cli_with_config(cli, config)?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    Ok(config)
}
