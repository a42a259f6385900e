//! JSON output formatting
//!
//! A run summary wraps the report of whichever mode ran, stamped with the
//! generation time and the tool version.

use crate::exchange::ExchangeReport;
use crate::pipeline::PipelineReport;
use crate::Result;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Report of the mode that ran
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RunReport {
    Pipeline(PipelineReport),
    Exchange(ExchangeReport),
}

/// Top-level JSON document
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub version: String,
    pub report: RunReport,
}

impl RunSummary {
    pub fn new(report: RunReport) -> Self {
        Self {
            generated_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            report,
        }
    }
}

impl From<PipelineReport> for RunSummary {
    fn from(report: PipelineReport) -> Self {
        Self::new(RunReport::Pipeline(report))
    }
}

impl From<ExchangeReport> for RunSummary {
    fn from(report: ExchangeReport) -> Self {
        Self::new(RunReport::Exchange(report))
    }
}

/// Write JSON output to file
pub fn write_json_output(output_path: &Path, summary: &RunSummary, pretty: bool) -> Result<()> {
    let file = File::create(output_path)
        .with_context(|| format!("Failed to create JSON output: {}", output_path.display()))?;
    let writer = BufWriter::new(file);

    if pretty {
        serde_json::to_writer_pretty(writer, summary)?;
    } else {
        serde_json::to_writer(writer, summary)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::harness::ReceivedResult;
    use crate::exchange::Role;
    use crate::pipeline::{StageTiming, ThreadPlacement};
    use tempfile::TempDir;

    fn pipeline_report() -> PipelineReport {
        PipelineReport {
            threads: 2,
            array_size: 16,
            factor: 2.0,
            seed: 7,
            initial_average: 0.5,
            final_average: 4.5,
            stages: vec![StageTiming {
                stage: "initialize".to_string(),
                seconds: 0.001,
            }],
            placements: vec![
                ThreadPlacement { thread: 0, cpu: Some(0) },
                ThreadPlacement { thread: 1, cpu: None },
            ],
        }
    }

    #[test]
    fn test_pipeline_summary_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("summary.json");

        write_json_output(&path, &RunSummary::from(pipeline_report()), true).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["report"]["mode"], "pipeline");
        assert_eq!(value["report"]["threads"], 2);
        assert_eq!(value["report"]["final_average"], 4.5);
        assert_eq!(value["report"]["placements"][1]["cpu"], serde_json::Value::Null);
        assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
        assert!(value["generated_at"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_exchange_summary_json() {
        let report = ExchangeReport {
            role: Role::Coordinator,
            rank: 0,
            size: 2,
            processor_name: "node-a".to_string(),
            tasks_sent: vec![1],
            results: vec![ReceivedResult {
                source: 1,
                text: "Work completed by process 1 on node-b".to_string(),
            }],
            task_received: None,
            result_sent: None,
            elapsed_secs: 0.25,
        };

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("exchange.json");
        write_json_output(&path, &RunSummary::from(report), false).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(!contents.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(value["report"]["mode"], "exchange");
        assert_eq!(value["report"]["role"], "Coordinator");
        assert_eq!(value["report"]["results"][0]["source"], 1);
    }

    #[test]
    fn test_unwritable_path_fails() {
        let summary = RunSummary::from(pipeline_report());
        assert!(write_json_output(Path::new("/nonexistent/dir/out.json"), &summary, true).is_err());
    }
}
