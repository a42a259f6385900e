//! Array pipeline driver
//!
//! Runs the stages in order on one fixed-size pool:
//! initialize → average → transform → average, then reports thread placement.

use crate::config::PipelineConfig;
use crate::pipeline::buffer::NumericBuffer;
use crate::pipeline::pool::{ThreadPlacement, WorkPool};
use crate::pipeline::stages;
use crate::util::affinity::{parse_cpu_list, warn_if_oversubscribed};
use crate::util::time::{format_duration, Stopwatch};
use crate::Result;
use anyhow::Context;
use serde::Serialize;
use std::io::Write;

/// Wall-clock time of one stage
#[derive(Debug, Clone, Serialize)]
pub struct StageTiming {
    pub stage: String,
    pub seconds: f64,
}

/// Outcome of a pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub threads: usize,
    pub array_size: usize,
    pub factor: f64,
    pub seed: u64,
    pub initial_average: f64,
    pub final_average: f64,
    pub stages: Vec<StageTiming>,
    pub placements: Vec<ThreadPlacement>,
}

/// Allocate the buffer and run the whole pipeline
///
/// Allocation failure is returned as an error carrying [`AllocationError`].
///
/// [`AllocationError`]: crate::error::AllocationError
pub fn run_pipeline<W: Write>(config: &PipelineConfig, out: &mut W) -> Result<PipelineReport> {
    writeln!(
        out,
        "Starting parallel array pipeline with {} threads...",
        config.threads
    )?;
    warn_if_oversubscribed(config.threads);

    let cpu_cores = config
        .cpu_cores
        .as_deref()
        .map(parse_cpu_list)
        .transpose()
        .context("Invalid cpu_cores")?;
    let pool = WorkPool::new(config.threads, cpu_cores)?;

    let mut buffer = NumericBuffer::allocate(config.array_size)?;
    log::debug!("Allocated {} bytes for {} elements", buffer.size_bytes(), buffer.len());

    run_stages(&pool, &mut buffer, config, out)
}

/// Run every stage on an already-allocated buffer
///
/// The buffer is initialized from `config.seed`, whatever it held before.
pub fn run_stages<W: Write>(
    pool: &WorkPool,
    buffer: &mut NumericBuffer,
    config: &PipelineConfig,
    out: &mut W,
) -> Result<PipelineReport> {
    let chunk_size = config.chunk_size;
    let mut timings = Vec::with_capacity(4);

    writeln!(out, "Initializing array...")?;
    let mut watch = Stopwatch::start();
    pool.install(|| stages::initialize(buffer.as_mut_slice(), config.seed, chunk_size));
    let elapsed = record(&mut timings, "initialize", &mut watch);
    writeln!(out, "Array initialization took {:.4} seconds", elapsed)?;

    writeln!(out, "Computing average...")?;
    watch.lap();
    let initial_average = pool.install(|| stages::compute_average(buffer.as_slice(), chunk_size));
    let elapsed = record(&mut timings, "average", &mut watch);
    writeln!(
        out,
        "Average value is {:.6} (calculated in {:.4} seconds)",
        initial_average, elapsed
    )?;

    writeln!(out, "Transforming array...")?;
    watch.lap();
    pool.install(|| stages::transform(buffer.as_mut_slice(), config.factor));
    let elapsed = record(&mut timings, "transform", &mut watch);
    writeln!(out, "Array transformation took {:.4} seconds", elapsed)?;

    writeln!(out, "Computing new average...")?;
    watch.lap();
    let final_average = pool.install(|| stages::compute_average(buffer.as_slice(), chunk_size));
    let elapsed = record(&mut timings, "new_average", &mut watch);
    writeln!(
        out,
        "New average value is {:.6} (calculated in {:.4} seconds)",
        final_average, elapsed
    )?;

    writeln!(out)?;
    writeln!(out, "Thread information:")?;
    let placements = pool.thread_report();
    for placement in &placements {
        match placement.cpu {
            Some(cpu) => writeln!(out, "Thread {} is running on CPU core {}", placement.thread, cpu)?,
            None => writeln!(out, "Thread {} is running on an unknown CPU core", placement.thread)?,
        }
    }

    writeln!(out, "Parallel array pipeline completed successfully.")?;

    Ok(PipelineReport {
        threads: pool.threads(),
        array_size: buffer.len(),
        factor: config.factor,
        seed: config.seed,
        initial_average,
        final_average,
        stages: timings,
        placements,
    })
}

fn record(timings: &mut Vec<StageTiming>, stage: &str, watch: &mut Stopwatch) -> f64 {
    let elapsed = watch.lap();
    log::debug!("Stage {} finished in {}", stage, format_duration(elapsed));
    timings.push(StageTiming {
        stage: stage.to_string(),
        seconds: elapsed.as_secs_f64(),
    });
    elapsed.as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AllocationError;

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            array_size: 10_000,
            threads: 2,
            factor: 2.0,
            seed: 2024,
            chunk_size: 256,
            cpu_cores: None,
        }
    }

    #[test]
    fn test_run_pipeline_report() {
        let config = small_config();
        let mut out = Vec::new();
        let report = run_pipeline(&config, &mut out).unwrap();

        assert_eq!(report.threads, 2);
        assert_eq!(report.array_size, 10_000);
        assert!(report.initial_average > 0.0 && report.initial_average < 1.0);

        // transform is linear: new mean = 4.5 * factor * old mean
        let expected = 4.5 * config.factor * report.initial_average;
        assert!((report.final_average - expected).abs() < 1e-9 * expected);

        let stages: Vec<&str> = report.stages.iter().map(|s| s.stage.as_str()).collect();
        assert_eq!(stages, vec!["initialize", "average", "transform", "new_average"]);
        assert_eq!(report.placements.len(), 2);
    }

    #[test]
    fn test_run_pipeline_output_order() {
        let mut out = Vec::new();
        run_pipeline(&small_config(), &mut out).unwrap();
        let output = String::from_utf8(out).unwrap();

        let markers = [
            "Initializing array...",
            "Average value is",
            "Transforming array...",
            "New average value is",
            "Thread information:",
            "Thread 0 is running on",
            "Thread 1 is running on",
            "completed successfully.",
        ];
        let mut last = 0;
        for marker in markers {
            let position = output[last..]
                .find(marker)
                .unwrap_or_else(|| panic!("missing {:?}", marker));
            last += position;
        }
    }

    #[test]
    fn test_run_pipeline_reproducible_across_thread_counts() {
        let mut config = small_config();
        let first = run_pipeline(&config, &mut Vec::new()).unwrap();
        config.threads = 3;
        let second = run_pipeline(&config, &mut Vec::new()).unwrap();

        assert!((first.initial_average - second.initial_average).abs() < 1e-12);
    }

    #[test]
    fn test_run_stages_overwrites_buffer() {
        let config = PipelineConfig {
            array_size: 4,
            ..small_config()
        };
        let pool = WorkPool::new(2, None).unwrap();
        let mut buffer = NumericBuffer::filled(4, 0.5).unwrap();

        let report = run_stages(&pool, &mut buffer, &config, &mut Vec::new()).unwrap();
        assert_eq!(report.array_size, 4);
        assert!(buffer.as_slice().iter().all(|&x| (0.0..9.0).contains(&x)));
    }

    #[test]
    fn test_allocation_failure_surfaces() {
        let config = PipelineConfig {
            array_size: usize::MAX,
            ..small_config()
        };
        let err = run_pipeline(&config, &mut Vec::new()).unwrap_err();
        assert!(err.downcast_ref::<AllocationError>().is_some());
    }

    #[test]
    fn test_invalid_cpu_cores() {
        let config = PipelineConfig {
            cpu_cores: Some("x-y".to_string()),
            ..small_config()
        };
        assert!(run_pipeline(&config, &mut Vec::new()).is_err());
    }
}
