//! Local group launcher
//!
//! Starts a complete exchange group on this host: binds the rendezvous
//! address, spawns ranks 1..N as child processes of the current executable in
//! participant mode, runs rank 0 in-process, then reaps the children.
//! Rank, size and rendezvous address reach the children through environment
//! variables, the way an MPI launcher hands them to its processes.

use crate::config::ExchangeConfig;
use crate::exchange::communicator::Communicator;
use crate::exchange::harness::{run_participant, ExchangeReport, HarnessOptions};
use anyhow::{Context, Result};
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::process::{Child, Command, ExitStatus};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::{sleep, Instant};

/// Participant ordinal
pub const ENV_RANK: &str = "HPCDEMO_RANK";
/// Group size
pub const ENV_SIZE: &str = "HPCDEMO_SIZE";
/// Rendezvous address
pub const ENV_COORDINATOR: &str = "HPCDEMO_COORDINATOR";

/// How long children may keep running once rank 0 is done
const CHILD_EXIT_GRACE: Duration = Duration::from_secs(10);

const CHILD_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Launch and run a full group of `config.processes` participants
///
/// `forward_args` are appended to every child's command line after
/// `--mode participant`.
pub async fn launch_local_group<W: Write>(
    config: &ExchangeConfig,
    exe: &Path,
    forward_args: &[String],
    out: &mut W,
) -> Result<ExchangeReport> {
    let size = config.processes;
    let listener = TcpListener::bind(&config.coordinator_addr)
        .await
        .with_context(|| format!("Failed to bind coordinator address {}", config.coordinator_addr))?;
    let addr = connect_address(listener.local_addr()?);
    log::info!("Coordinator listening on {} for {} workers", addr, size - 1);

    let mut children: Vec<(usize, Child)> = Vec::with_capacity(size.saturating_sub(1));
    for rank in 1..size {
        match spawn_participant(exe, rank, size, &addr, forward_args) {
            Ok(child) => {
                log::debug!("Spawned rank {} (PID: {})", rank, child.id());
                children.push((rank, child));
            }
            Err(e) => {
                kill_all(&mut children);
                return Err(e);
            }
        }
    }

    let outcome = run_rank_zero(listener, config, out).await;

    match outcome {
        Ok(report) => {
            wait_for_participants(children, CHILD_EXIT_GRACE).await?;
            Ok(report)
        }
        Err(e) => {
            kill_all(&mut children);
            Err(e)
        }
    }
}

async fn run_rank_zero<W: Write>(
    listener: TcpListener,
    config: &ExchangeConfig,
    out: &mut W,
) -> Result<ExchangeReport> {
    let join_timeout = Duration::from_secs(config.join_timeout_secs);
    let comm = Communicator::coordinator(listener, config.processes, join_timeout)
        .await
        .context("Failed to form process group")?;
    run_participant(comm, &HarnessOptions::from(config), out).await
}

/// Spawn one participant process
pub fn spawn_participant(
    exe: &Path,
    rank: usize,
    size: usize,
    coordinator: &str,
    forward_args: &[String],
) -> Result<Child> {
    let mut cmd = Command::new(exe);
    cmd.arg("--mode").arg("participant");
    cmd.args(forward_args);
    cmd.env(ENV_RANK, rank.to_string());
    cmd.env(ENV_SIZE, size.to_string());
    cmd.env(ENV_COORDINATOR, coordinator);

    cmd.spawn()
        .with_context(|| format!("Failed to spawn participant for rank {}", rank))
}

/// Wait for every child, killing those still running after `grace`
///
/// Fails if any child exited unsuccessfully or had to be killed.
pub async fn wait_for_participants(children: Vec<(usize, Child)>, grace: Duration) -> Result<()> {
    let deadline = Instant::now() + grace;
    let mut failures = Vec::new();

    for (rank, mut child) in children {
        match wait_child(&mut child, deadline).await? {
            Some(status) if status.success() => {
                log::debug!("Rank {} exited cleanly", rank);
            }
            Some(status) => {
                failures.push(format!("rank {} exited with {}", rank, status));
            }
            None => {
                log::warn!("Rank {} still running after {:?}, killing", rank, grace);
                child.kill()?;
                child.wait()?;
                failures.push(format!("rank {} did not exit", rank));
            }
        }
    }

    if !failures.is_empty() {
        anyhow::bail!("Participant failure: {}", failures.join(", "));
    }
    Ok(())
}

async fn wait_child(child: &mut Child, deadline: Instant) -> Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        sleep(CHILD_POLL_INTERVAL).await;
    }
}

fn kill_all(children: &mut [(usize, Child)]) {
    for (rank, child) in children.iter_mut() {
        if let Err(e) = child.kill() {
            log::debug!("Failed to kill rank {}: {}", rank, e);
        }
        let _ = child.wait();
    }
}

/// Address children should dial for a listener bound to `local`
///
/// A wildcard bind is reachable locally through loopback.
pub fn connect_address(local: SocketAddr) -> String {
    let ip = match local.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, local.port()).to_string()
}
