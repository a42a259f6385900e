//! Fan-out/fan-in exchange between the coordinator and its workers
//!
//! Coordinator (rank 0):
//! 1. Simulated preparatory work
//! 2. Sends one task to each worker, in rank order
//! 3. Receives one result from each worker, in rank order, printing each
//!
//! Worker (rank i): receives its task, simulates work, sends one result.

use crate::config::ExchangeConfig;
use crate::exchange::communicator::Communicator;
use crate::exchange::protocol::{truncate_to, PAYLOAD_CAPACITY};
use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Participant role, fixed at group formation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Role {
    Coordinator,
    Worker(usize),
}

impl Role {
    pub fn from_rank(rank: usize) -> Self {
        if rank == 0 {
            Role::Coordinator
        } else {
            Role::Worker(rank)
        }
    }
}

/// Timing and sizing knobs for one participant
#[derive(Debug, Clone)]
pub struct HarnessOptions {
    /// Simulated work on the coordinator before distributing tasks
    pub coordinator_delay: Duration,
    /// Simulated work on each worker between task and result
    pub work_delay: Duration,
    /// Bound on every receive; `None` waits indefinitely
    pub receive_timeout: Option<Duration>,
    /// Receive buffer size in bytes, terminator included
    pub max_message_len: usize,
}

impl From<&ExchangeConfig> for HarnessOptions {
    fn from(config: &ExchangeConfig) -> Self {
        Self {
            coordinator_delay: Duration::from_millis(config.coordinator_delay_ms),
            work_delay: Duration::from_millis(config.work_delay_ms),
            receive_timeout: config.receive_timeout_secs.map(Duration::from_secs_f64),
            max_message_len: config.max_message_len,
        }
    }
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self::from(&ExchangeConfig::default())
    }
}

/// One result as the coordinator received it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceivedResult {
    pub source: usize,
    pub text: String,
}

/// What one participant did during the exchange
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeReport {
    pub role: Role,
    pub rank: usize,
    pub size: usize,
    pub processor_name: String,
    /// Destinations of tasks sent (coordinator only)
    pub tasks_sent: Vec<usize>,
    /// Results received, in receive order (coordinator only)
    pub results: Vec<ReceivedResult>,
    /// Task received (worker only)
    pub task_received: Option<String>,
    /// Result sent (worker only)
    pub result_sent: Option<String>,
    pub elapsed_secs: f64,
}

/// Task text addressed to `rank`
pub fn task_message(rank: usize) -> String {
    format!("Task data for process {}", rank)
}

/// Result text produced by `rank` on `processor_name`
///
/// Bounded to the fixed payload capacity.
pub fn result_message(rank: usize, processor_name: &str) -> String {
    truncate_to(
        format!("Work completed by process {} on {}", rank, processor_name),
        PAYLOAD_CAPACITY,
    )
}

/// Run this participant's side of the exchange, then finalize the group
///
/// Progress lines go to `out`.
pub async fn run_participant<W: Write>(
    mut comm: Communicator,
    options: &HarnessOptions,
    out: &mut W,
) -> Result<ExchangeReport> {
    let start = Instant::now();
    let discovery = comm.discovery();

    writeln!(
        out,
        "Hello world from processor {}, rank {} out of {} processors",
        discovery.processor_name, discovery.rank, discovery.size
    )?;

    let mut report = ExchangeReport {
        role: Role::from_rank(discovery.rank),
        rank: discovery.rank,
        size: discovery.size,
        processor_name: discovery.processor_name,
        tasks_sent: Vec::new(),
        results: Vec::new(),
        task_received: None,
        result_sent: None,
        elapsed_secs: 0.0,
    };

    match report.role {
        Role::Coordinator => run_coordinator(&mut comm, options, &mut report, out).await?,
        Role::Worker(_) => run_worker(&mut comm, options, &mut report, out).await?,
    }

    comm.finalize().await.context("Failed to finalize exchange")?;

    report.elapsed_secs = start.elapsed().as_secs_f64();
    Ok(report)
}

async fn run_coordinator<W: Write>(
    comm: &mut Communicator,
    options: &HarnessOptions,
    report: &mut ExchangeReport,
    out: &mut W,
) -> Result<()> {
    let size = comm.size();

    writeln!(out, "Primary process is performing some additional computation...")?;
    sleep(options.coordinator_delay).await;

    writeln!(out, "Primary process is distributing work to other processes...")?;
    for rank in 1..size {
        comm.send(&task_message(rank), rank)
            .await
            .with_context(|| format!("Failed to send task to process {}", rank))?;
        report.tasks_sent.push(rank);
    }

    for rank in 1..size {
        let text = comm
            .receive(options.max_message_len, rank, options.receive_timeout)
            .await
            .with_context(|| format!("Failed to receive result from process {}", rank))?;
        writeln!(out, "Received result from process {}: {}", rank, text)?;
        report.results.push(ReceivedResult { source: rank, text });
    }

    writeln!(out, "Primary process has completed all work.")?;
    Ok(())
}

async fn run_worker<W: Write>(
    comm: &mut Communicator,
    options: &HarnessOptions,
    report: &mut ExchangeReport,
    out: &mut W,
) -> Result<()> {
    let rank = comm.rank();

    let task = comm
        .receive(options.max_message_len, 0, options.receive_timeout)
        .await
        .with_context(|| format!("Process {} failed to receive its task", rank))?;
    writeln!(out, "Process {} received: {}", rank, task)?;
    report.task_received = Some(task);

    sleep(options.work_delay).await;

    let result = result_message(rank, comm.processor_name());
    comm.send(&result, 0)
        .await
        .with_context(|| format!("Process {} failed to send its result", rank))?;
    report.result_sent = Some(result);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::communicator::processor_name;
    use tokio::net::TcpListener;

    const JOIN: Duration = Duration::from_secs(5);

    fn fast_options() -> HarnessOptions {
        HarnessOptions {
            coordinator_delay: Duration::from_millis(10),
            work_delay: Duration::from_millis(10),
            receive_timeout: Some(Duration::from_secs(5)),
            max_message_len: PAYLOAD_CAPACITY,
        }
    }

    /// Run a whole group in-process; returns (coordinator report, output, worker reports)
    async fn run_group(size: usize) -> (ExchangeReport, String, Vec<ExchangeReport>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let options = fast_options();

        let mut handles = Vec::new();
        for rank in 1..size {
            let addr = addr.clone();
            let options = options.clone();
            handles.push(tokio::spawn(async move {
                let comm = Communicator::worker(&addr, rank, size, JOIN).await.unwrap();
                let mut out = Vec::new();
                run_participant(comm, &options, &mut out).await.unwrap()
            }));
        }

        let comm = Communicator::coordinator(listener, size, JOIN).await.unwrap();
        let mut out = Vec::new();
        let report = run_participant(comm, &options, &mut out).await.unwrap();

        let mut workers = Vec::new();
        for handle in handles {
            workers.push(handle.await.unwrap());
        }
        (report, String::from_utf8(out).unwrap(), workers)
    }

    #[test]
    fn test_role_from_rank() {
        assert_eq!(Role::from_rank(0), Role::Coordinator);
        assert_eq!(Role::from_rank(3), Role::Worker(3));
    }

    #[test]
    fn test_message_text() {
        assert_eq!(task_message(2), "Task data for process 2");
        assert_eq!(result_message(1, "node-a"), "Work completed by process 1 on node-a");
    }

    #[test]
    fn test_result_message_bounded() {
        let long_host = "h".repeat(200);
        let text = result_message(7, &long_host);
        assert_eq!(text.len(), PAYLOAD_CAPACITY - 1);
    }

    #[tokio::test]
    async fn test_three_participants_end_to_end() {
        let (report, output, workers) = run_group(3).await;
        let host = processor_name();

        assert_eq!(report.role, Role::Coordinator);
        assert_eq!(report.tasks_sent, vec![1, 2]);
        assert_eq!(
            report.results,
            vec![
                ReceivedResult {
                    source: 1,
                    text: format!("Work completed by process 1 on {}", host),
                },
                ReceivedResult {
                    source: 2,
                    text: format!("Work completed by process 2 on {}", host),
                },
            ]
        );

        let first = output.find("Received result from process 1").unwrap();
        let second = output.find("Received result from process 2").unwrap();
        let done = output.find("Primary process has completed all work.").unwrap();
        assert!(first < second && second < done);

        for worker in &workers {
            let rank = worker.rank;
            assert_eq!(worker.task_received.as_deref(), Some(task_message(rank).as_str()));
            assert_eq!(worker.result_sent, Some(result_message(rank, &host)));
            assert!(worker.tasks_sent.is_empty());
            assert!(worker.results.is_empty());
        }
    }

    #[tokio::test]
    async fn test_message_counts_for_various_sizes() {
        for size in 2..=5 {
            let (report, _output, workers) = run_group(size).await;

            assert_eq!(report.tasks_sent.len(), size - 1);
            assert_eq!(report.results.len(), size - 1);
            let sources: Vec<usize> = report.results.iter().map(|r| r.source).collect();
            assert_eq!(sources, (1..size).collect::<Vec<_>>());

            assert_eq!(workers.len(), size - 1);
            for worker in &workers {
                assert!(worker.task_received.is_some());
                assert!(worker.result_sent.is_some());
            }
        }
    }

    #[tokio::test]
    async fn test_single_participant_completes_immediately() {
        let (report, output, workers) = run_group(1).await;

        assert!(workers.is_empty());
        assert!(report.tasks_sent.is_empty());
        assert!(report.results.is_empty());
        assert!(output.contains("Primary process has completed all work."));
    }

    #[tokio::test]
    async fn test_coordinator_times_out_on_silent_worker() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        // Joins but never answers its task
        let silent = tokio::spawn(async move {
            let mut comm = Communicator::worker(&addr, 1, 2, JOIN).await.unwrap();
            let _ = comm.receive(PAYLOAD_CAPACITY, 0, None).await;
            sleep(Duration::from_secs(2)).await;
        });

        let comm = Communicator::coordinator(listener, 2, JOIN).await.unwrap();
        let options = HarnessOptions {
            receive_timeout: Some(Duration::from_millis(100)),
            ..fast_options()
        };
        let mut out = Vec::new();
        let result = run_participant(comm, &options, &mut out).await;

        assert!(result.is_err());
        silent.abort();
    }
}
