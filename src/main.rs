//! hpcdemo CLI entry point

use anyhow::Context;
use hpcdemo::config::cli::{Cli, ExecutionMode};
use hpcdemo::config::toml::load_config;
use hpcdemo::config::Config;
use hpcdemo::exchange::{
    launch_local_group, run_participant, Communicator, ExchangeReport, GroupSpec, HarnessOptions,
};
use hpcdemo::output::{write_json_output, RunSummary};
use hpcdemo::pipeline::run_pipeline;
use hpcdemo::Result;
use std::io;
use std::process;
use std::time::Duration;

fn main() {
    let cli = Cli::parse_args();
    init_logging(&cli);

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn init_logging(cli: &Cli) {
    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    cli.validate()?;
    let config = load_config(&cli)?;

    if cli.dry_run {
        print_configuration(&cli, &config);
        println!();
        println!("Dry run mode - configuration validated successfully");
        return Ok(());
    }

    let summary = match cli.mode {
        ExecutionMode::Pipeline => run_pipeline_mode(&config)?,
        ExecutionMode::Exchange => run_exchange_mode(&cli, &config)?,
        ExecutionMode::Participant => run_participant_mode(&cli, &config)?,
    };

    if let Some(ref path) = config.output.json_output {
        write_json_output(path, &summary, config.output.pretty_json)?;
        log::info!("Wrote run summary to {}", path.display());
    }

    Ok(())
}

/// Run the array pipeline on this host
fn run_pipeline_mode(config: &Config) -> Result<RunSummary> {
    log::info!("Pipeline: {}", config.pipeline);
    let mut stdout = io::stdout().lock();
    let report = run_pipeline(&config.pipeline, &mut stdout)?;
    Ok(report.into())
}

/// Launch a whole exchange group on this host
fn run_exchange_mode(cli: &Cli, config: &Config) -> Result<RunSummary> {
    log::info!("Exchange: {}", config.exchange);
    let exe = std::env::current_exe().context("Failed to locate current executable")?;
    let forward_args = cli.participant_args();

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    let report = runtime.block_on(async {
        let mut stdout = io::stdout();
        launch_local_group(&config.exchange, &exe, &forward_args, &mut stdout).await
    })?;

    Ok(report.into())
}

/// Run one participant that was started by a launcher or by hand
fn run_participant_mode(cli: &Cli, config: &Config) -> Result<RunSummary> {
    // validate() guarantees these for participant mode
    let (rank, size) = match (cli.rank, cli.size) {
        (Some(rank), Some(size)) => (rank, size),
        _ => anyhow::bail!("Participant mode requires --rank and --size"),
    };

    let spec = GroupSpec {
        rank,
        size,
        coordinator_addr: config.exchange.coordinator_addr.clone(),
        join_timeout: Duration::from_secs(config.exchange.join_timeout_secs),
    };
    let options = HarnessOptions::from(&config.exchange);

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    let report = runtime.block_on(join_and_run(&spec, &options))?;

    Ok(report.into())
}

async fn join_and_run(spec: &GroupSpec, options: &HarnessOptions) -> Result<ExchangeReport> {
    let comm = Communicator::discover(spec).await.with_context(|| {
        format!("Rank {} failed to join group at {}", spec.rank, spec.coordinator_addr)
    })?;
    let mut stdout = io::stdout();
    run_participant(comm, options, &mut stdout).await
}

fn print_configuration(cli: &Cli, config: &Config) {
    println!("hpcdemo v{}", env!("CARGO_PKG_VERSION"));
    match cli.mode {
        ExecutionMode::Pipeline => println!("Pipeline: {}", config.pipeline),
        ExecutionMode::Exchange => println!("Exchange: {}", config.exchange),
        ExecutionMode::Participant => println!(
            "Participant: rank {} of {}, coordinator {}",
            cli.rank.unwrap_or_default(),
            config.exchange.processes,
            config.exchange.coordinator_addr
        ),
    }
    if let Some(ref path) = config.output.json_output {
        println!("JSON output: {}", path.display());
    }
}
