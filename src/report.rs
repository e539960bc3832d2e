//! Structured report of one pipeline run.
//!
//! The report is an explicit value threaded through the orchestrator, so each
//! run (and each test) owns an isolated one.

use crate::scorer::ScoredRecord;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Score at or above which a patent is highly relevant
pub const HIGH_RELEVANCE: u64 = 30;
/// Score at or above which a patent is moderately relevant
pub const MEDIUM_RELEVANCE: u64 = 10;

/// Overall run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    NotStarted,
    Running,
    Completed,
    Failed,
}

/// Outcome of a single stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    Failed,
}

/// What one stage did
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub output_files: Vec<PathBuf>,
    pub processed_count: usize,
    pub matched_count: usize,
    pub unmatched_count: usize,
    pub error_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageReport {
    pub fn completed() -> Self {
        Self {
            status: StageStatus::Completed,
            input_file: None,
            output_files: Vec::new(),
            processed_count: 0,
            matched_count: 0,
            unmatched_count: 0,
            error_count: 0,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Failed,
            error: Some(error.into()),
            ..Self::completed()
        }
    }

    pub fn with_input(mut self, path: &Path) -> Self {
        self.input_file = Some(path.to_path_buf());
        self
    }

    pub fn with_output(mut self, path: &Path) -> Self {
        self.output_files.push(path.to_path_buf());
        self
    }

    pub fn with_counts(mut self, processed: usize, matched: usize, unmatched: usize, errors: usize) -> Self {
        self.processed_count = processed;
        self.matched_count = matched;
        self.unmatched_count = unmatched;
        self.error_count = errors;
        self
    }
}

/// One entry of the top-patents list
#[derive(Debug, Clone, Serialize)]
pub struct TopPatent {
    pub ranking: usize,
    pub patent_id: String,
    pub title: String,
    pub relevance_score: u64,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub abstract_title: Option<String>,
    pub abstract_url: Option<String>,
}

/// Relevance summary of the scored dataset
#[derive(Debug, Clone, Serialize, Default)]
pub struct FinalResults {
    pub total_patents: usize,
    pub high_relevance_count: usize,
    pub medium_relevance_count: usize,
    pub low_relevance_count: usize,
    pub undefined_score_count: usize,
    pub top_patents: Vec<TopPatent>,
}

impl FinalResults {
    /// Summarize scored records; `ranked` must already be sorted.
    pub fn summarize(scored: &[ScoredRecord], ranked: &[ScoredRecord], top_n: usize) -> Self {
        let defined: Vec<u64> = scored.iter().filter_map(|r| r.relevance_score).collect();

        let top_patents = ranked
            .iter()
            .take(top_n)
            .enumerate()
            .map(|(i, r)| TopPatent {
                ranking: i + 1,
                patent_id: r.record.patent.id.clone(),
                title: r.record.patent.title.clone(),
                relevance_score: r.relevance_score.unwrap_or(0),
                abstract_text: r.record.abstract_text.clone(),
                abstract_title: r.record.abstract_title.clone(),
                abstract_url: r.record.abstract_url.clone(),
            })
            .collect();

        Self {
            total_patents: scored.len(),
            high_relevance_count: defined.iter().filter(|s| **s >= HIGH_RELEVANCE).count(),
            medium_relevance_count: defined
                .iter()
                .filter(|s| (MEDIUM_RELEVANCE..HIGH_RELEVANCE).contains(*s))
                .count(),
            low_relevance_count: defined.iter().filter(|s| **s < MEDIUM_RELEVANCE).count(),
            undefined_score_count: scored.len() - defined.len(),
            top_patents,
        }
    }
}

/// Per-run state accumulated across stages
#[derive(Debug, Clone, Serialize, Default)]
pub struct RunReport {
    pub status: RunStatus,
    pub start_time: Option<DateTime<Local>>,
    pub end_time: Option<DateTime<Local>>,
    pub duration_secs: Option<f64>,
    pub stages: BTreeMap<String, StageReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_results: Option<FinalResults>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.status = RunStatus::Running;
        self.start_time = Some(Local::now());
    }

    pub fn record_stage(&mut self, stage: &str, report: StageReport) {
        self.stages.insert(stage.to_string(), report);
    }

    pub fn stage(&self, stage: &str) -> Option<&StageReport> {
        self.stages.get(stage)
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Mark a stage failed and record the error for the run.
    pub fn fail_stage(&mut self, stage: &str, error: impl Into<String>) {
        let error = error.into();
        self.errors.push(format!("{}: {}", stage, error));
        self.record_stage(stage, StageReport::failed(error));
    }

    /// Fail the run with an error not tied to any stage.
    pub fn abort(&mut self, error: impl Into<String>) {
        if self.start_time.is_none() {
            self.start();
        }
        self.errors.push(error.into());
        self.finish(RunStatus::Failed);
    }

    pub fn finish(&mut self, status: RunStatus) {
        let end = Local::now();
        self.status = status;
        self.duration_secs = self
            .start_time
            .map(|start| (end - start).num_milliseconds() as f64 / 1000.0);
        self.end_time = Some(end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patent::{EnrichedPatentRecord, PatentRecord};

    fn scored(id: &str, score: Option<u64>) -> ScoredRecord {
        ScoredRecord {
            record: EnrichedPatentRecord::not_found(PatentRecord {
                id: id.to_string(),
                ..Default::default()
            }),
            relevance_score: score,
        }
    }

    #[test]
    fn test_run_lifecycle_serializes() {
        let mut report = RunReport::new();
        assert_eq!(report.status, RunStatus::NotStarted);

        report.start();
        report.record_stage("csv_to_json", StageReport::completed().with_counts(3, 0, 0, 0));
        report.fail_stage("abstract_fetch", "IO error: disk full");
        report.finish(RunStatus::Failed);

        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["stages"]["csv_to_json"]["status"], "completed");
        assert_eq!(json["stages"]["abstract_fetch"]["error"], "IO error: disk full");
        assert_eq!(json["errors"][0], "abstract_fetch: IO error: disk full");
        assert!(json["start_time"].is_string());
        assert!(json["end_time"].is_string());
        assert!(report.duration_secs.is_some());
    }

    #[test]
    fn test_abort_before_start_sets_times() {
        let mut report = RunReport::new();
        report.abort("Config error: bad");

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.errors, vec!["Config error: bad".to_string()]);
        assert!(report.start_time.is_some());
        assert!(report.end_time.is_some());
        assert!(report.stages.is_empty());
    }

    #[test]
    fn test_final_results_buckets() {
        let all = vec![
            scored("A", Some(45)),
            scored("B", Some(10)),
            scored("C", Some(29)),
            scored("D", Some(0)),
            scored("E", None),
        ];
        let ranked = crate::scorer::rank(&all);
        let summary = FinalResults::summarize(&all, &ranked, 2);

        assert_eq!(summary.total_patents, 5);
        assert_eq!(summary.high_relevance_count, 1);
        assert_eq!(summary.medium_relevance_count, 2);
        assert_eq!(summary.low_relevance_count, 1);
        assert_eq!(summary.undefined_score_count, 1);
        let top: Vec<(usize, &str)> = summary
            .top_patents
            .iter()
            .map(|t| (t.ranking, t.patent_id.as_str()))
            .collect();
        assert_eq!(top, vec![(1, "A"), (2, "C")]);
    }
}
