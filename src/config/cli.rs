//! CLI argument parsing using clap

use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;

/// Execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutionMode {
    /// Array pipeline (default) - parallel stages on one host
    Pipeline,
    /// Exchange launcher - run a whole group on this host
    Exchange,
    /// Exchange participant - one rank, started by a launcher or by hand
    Participant,
}

/// hpcdemo - message-passing exchange and data-parallel pipeline demos
#[derive(Parser, Debug)]
#[command(name = "hpcdemo")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Execution mode: pipeline, exchange, or participant
    #[arg(long, value_enum, default_value = "pipeline")]
    pub mode: ExecutionMode,

    /// TOML configuration file (CLI options take precedence)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    // === Exchange Options ===
    /// Number of participants, coordinator included (exchange mode)
    #[arg(short = 'n', long)]
    pub processes: Option<usize>,

    /// This participant's rank (participant mode)
    #[arg(long, env = "HPCDEMO_RANK")]
    pub rank: Option<usize>,

    /// Group size (participant mode)
    #[arg(long, env = "HPCDEMO_SIZE")]
    pub size: Option<usize>,

    /// Coordinator rendezvous address, e.g. "10.0.1.10:7000"
    #[arg(long, env = "HPCDEMO_COORDINATOR")]
    pub coordinator: Option<String>,

    /// Simulated coordinator work before distributing tasks (milliseconds)
    #[arg(long)]
    pub coordinator_delay_ms: Option<u64>,

    /// Simulated worker computation (milliseconds)
    #[arg(long)]
    pub work_delay_ms: Option<u64>,

    /// Upper bound on group formation (seconds)
    #[arg(long)]
    pub join_timeout_secs: Option<u64>,

    /// Upper bound on each receive (seconds); waits indefinitely when unset
    #[arg(long)]
    pub receive_timeout_secs: Option<f64>,

    // === Pipeline Options ===
    /// Number of pool threads
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Number of elements in the buffer
    #[arg(short = 's', long)]
    pub array_size: Option<usize>,

    /// Transform scale factor
    #[arg(long)]
    pub factor: Option<f64>,

    /// Base seed for buffer initialization
    #[arg(long)]
    pub seed: Option<u64>,

    /// Elements per work unit
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// CPU cores to pin pool threads to (e.g., "0,2-4")
    #[arg(long)]
    pub cpu_cores: Option<String>,

    // === Output Options ===
    /// Write the run summary as JSON
    #[arg(long)]
    pub json_output: Option<PathBuf>,

    /// Verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Validate configuration and exit
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate mode-specific requirements
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.mode == ExecutionMode::Participant {
            let (rank, size) = match (self.rank, self.size) {
                (Some(rank), Some(size)) => (rank, size),
                _ => anyhow::bail!("Participant mode requires --rank and --size (or HPCDEMO_RANK/HPCDEMO_SIZE)"),
            };
            if rank >= size {
                anyhow::bail!("Rank {} out of range for group of size {}", rank, size);
            }
            if self.coordinator.is_none() {
                anyhow::bail!("Participant mode requires --coordinator (or HPCDEMO_COORDINATOR)");
            }
        }

        if self.mode != ExecutionMode::Participant && (self.rank.is_some() || self.size.is_some()) {
            log::warn!("--rank/--size are only used in participant mode");
        }

        Ok(())
    }

    /// Log level implied by `-v` count
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }

    /// Arguments a launcher forwards to the participants it spawns
    ///
    /// Rank, size and coordinator travel through the environment instead.
    pub fn participant_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(ref config) = self.config {
            args.push("--config".to_string());
            args.push(config.display().to_string());
        }
        if let Some(ms) = self.coordinator_delay_ms {
            args.push("--coordinator-delay-ms".to_string());
            args.push(ms.to_string());
        }
        if let Some(ms) = self.work_delay_ms {
            args.push("--work-delay-ms".to_string());
            args.push(ms.to_string());
        }
        if let Some(secs) = self.join_timeout_secs {
            args.push("--join-timeout-secs".to_string());
            args.push(secs.to_string());
        }
        if let Some(secs) = self.receive_timeout_secs {
            args.push("--receive-timeout-secs".to_string());
            args.push(secs.to_string());
        }
        if self.verbose > 0 {
            args.push(format!("-{}", "v".repeat(self.verbose as usize)));
        }

        args
    }
}
