//! Pipeline orchestration.
//!
//! Runs the stages in order, writing a timestamped JSON artifact after each:
//!
//! 1. `csv_to_json` - `converted_patents_<ts>.json`
//! 2. `abstract_fetch` - `patents_with_abstracts_<ts>.json`
//! 3. `abstract_integration` - `integrated_patents_<ts>.json`
//! 4. `relevance_scoring` - `scored_patents_<ts>.json` and
//!    `scored_patents_sorted_<ts>.json`
//!
//! A failing stage is recorded in the [`RunReport`] and stops the run.

use crate::config::PipelineConfig;
use crate::convert::{convert_file, CsvConverter};
use crate::error::{PatentError, Result};
use crate::merge::{merge, merge_stats};
use crate::patent::{EnrichedPatentRecord, PatentRecord};
use crate::report::{FinalResults, RunReport, RunStatus, StageReport};
use crate::resolver::{skipped_batch, AbstractResolver, BatchStats, BatchWindow, ResolverSettings};
use crate::scorer::{rank, RelevanceScorer, ScoredRecord};
use crate::scrape::AbstractScraper;
use crate::store::AbstractStore;
use chrono::Local;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    CsvToJson,
    AbstractFetch,
    AbstractIntegration,
    RelevanceScoring,
}

impl Stage {
    /// Name used in the run report
    pub fn name(self) -> &'static str {
        match self {
            Self::CsvToJson => "csv_to_json",
            Self::AbstractFetch => "abstract_fetch",
            Self::AbstractIntegration => "abstract_integration",
            Self::RelevanceScoring => "relevance_scoring",
        }
    }

    /// Parse a CLI name such as `csv-to-json`.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.replace('-', "_").as_str() {
            "csv_to_json" => Ok(Self::CsvToJson),
            "abstract_fetch" => Ok(Self::AbstractFetch),
            "abstract_integration" => Ok(Self::AbstractIntegration),
            "relevance_scoring" => Ok(Self::RelevanceScoring),
            other => Err(PatentError::Validation(format!("Unknown stage: {}", other))),
        }
    }
}

/// Per-invocation options not stored in the config file
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub window: BatchWindow,
    pub skip_abstract_fetch: bool,
    /// Last stage to run
    pub until: Stage,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            window: BatchWindow::default(),
            skip_abstract_fetch: false,
            until: Stage::RelevanceScoring,
        }
    }
}

/// Sequences the pipeline stages
pub struct Orchestrator<S> {
    config: PipelineConfig,
    options: RunOptions,
    resolver: AbstractResolver<S>,
}

impl<S: AbstractScraper> Orchestrator<S> {
    /// Build an orchestrator; opens the abstract store and the output directory.
    pub fn new(config: PipelineConfig, scraper: S, options: RunOptions) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.output.base_dir)?;

        let store = AbstractStore::open(&config.fetcher.abstracts_dir)?;
        let resolver = AbstractResolver::new(store, scraper, ResolverSettings::from(&config.fetcher));

        Ok(Self {
            config,
            options,
            resolver,
        })
    }

    /// Run every stage up to `options.until`, recording into `report`.
    ///
    /// # Errors
    ///
    /// Returns the first stage failure; the report is finalized either way.
    pub async fn run(&self, report: &mut RunReport) -> Result<()> {
        report.start();
        info!(input = ?self.config.input.csv_file, until = self.options.until.name(), "Starting patent pipeline");

        let result = self.run_stages(report).await;
        match &result {
            Ok(()) => {
                report.finish(RunStatus::Completed);
                info!("Patent pipeline completed successfully");
            }
            Err(PatentError::Stage { .. }) => {
                report.finish(RunStatus::Failed);
                error!("Patent pipeline failed");
            }
            Err(e) => {
                report.abort(e.to_string());
                error!(error = %e, "Patent pipeline failed");
            }
        }
        result
    }

    async fn run_stages(&self, report: &mut RunReport) -> Result<()> {
        let stamp = self.timestamp()?;

        let patents = record(report, Stage::CsvToJson, self.convert_csv(&stamp))?;
        if self.options.until == Stage::CsvToJson {
            return Ok(());
        }

        let stats = record(report, Stage::AbstractFetch, self.fetch_abstracts(&patents, &stamp).await)?;
        if stats.invalid > 0 {
            report.warn(format!("{} invalid patent records were not fetched", stats.invalid));
        }
        if self.options.until == Stage::AbstractFetch {
            return Ok(());
        }

        let merged = record(report, Stage::AbstractIntegration, self.integrate(&patents, &stamp))?;
        if self.options.until == Stage::AbstractIntegration {
            return Ok(());
        }

        let (scored, ranked) = record(report, Stage::RelevanceScoring, self.score(&merged, &stamp))?;
        let summary = FinalResults::summarize(&scored, &ranked, self.config.scorer.top_n);
        info!(total = summary.total_patents, "Final results generated");
        report.final_results = Some(summary);

        Ok(())
    }

    fn convert_csv(&self, stamp: &str) -> Result<(Vec<PatentRecord>, StageReport)> {
        let csv_file = &self.config.input.csv_file;
        if !csv_file.exists() {
            return Err(PatentError::Validation(format!("Input CSV file not found: {}", csv_file.display())));
        }

        let output = self.artifact_path("converted_patents", stamp);
        let patents = convert_file(&CsvConverter, csv_file, &output)?;

        let stage = StageReport::completed()
            .with_input(csv_file)
            .with_output(&output)
            .with_counts(patents.len(), 0, 0, 0);
        Ok((patents, stage))
    }

    async fn fetch_abstracts(&self, patents: &[PatentRecord], stamp: &str) -> Result<(BatchStats, StageReport)> {
        let (records, stats) = if self.options.skip_abstract_fetch {
            let records = skipped_batch(patents);
            let stats = BatchStats {
                total: records.len(),
                ..Default::default()
            };
            (records, stats)
        } else {
            let outcome = self.resolver.resolve_batch(patents, self.options.window).await?;
            (outcome.records, outcome.stats)
        };

        let output = self.artifact_path("patents_with_abstracts", stamp);
        crate::write_json(&output, &records)?;

        let matched = records.iter().filter(|r| r.has_abstract()).count();
        let stage = StageReport::completed()
            .with_output(&output)
            .with_counts(records.len(), matched, records.len() - matched, stats.failed);
        info!(processed = records.len(), output = ?output, "Abstract fetch stage completed");
        Ok((stats, stage))
    }

    fn integrate(&self, patents: &[PatentRecord], stamp: &str) -> Result<(Vec<EnrichedPatentRecord>, StageReport)> {
        let store_dir = &self.config.fetcher.abstracts_dir;
        let merged = merge(patents, store_dir)?;

        let output = self.artifact_path("integrated_patents", stamp);
        crate::write_json(&output, &merged)?;

        let stats = merge_stats(&merged);
        let stage = StageReport::completed()
            .with_input(store_dir)
            .with_output(&output)
            .with_counts(stats.processed, stats.matched, stats.unmatched, stats.error_count);
        Ok((merged, stage))
    }

    fn score(
        &self,
        merged: &[EnrichedPatentRecord],
        stamp: &str,
    ) -> Result<((Vec<ScoredRecord>, Vec<ScoredRecord>), StageReport)> {
        let keywords_file = &self.config.scorer.keywords_file;
        let scorer = RelevanceScorer::from_file(keywords_file)?;

        let scored = scorer.score_all(merged);
        let ranked = rank(&scored);
        if ranked.len() < scored.len() {
            warn!(undefined = scored.len() - ranked.len(), "Records with undefined scores left out of ranking");
        }

        let output = self.artifact_path("scored_patents", stamp);
        crate::write_json(&output, &scored)?;
        let sorted_output = self.artifact_path("scored_patents_sorted", stamp);
        crate::write_json(&sorted_output, &ranked)?;

        info!(scored = scored.len(), sorted_output = ?sorted_output, "Relevance scoring completed");
        let stage = StageReport::completed()
            .with_input(keywords_file)
            .with_output(&output)
            .with_output(&sorted_output)
            .with_counts(scored.len(), ranked.len(), scored.len() - ranked.len(), 0);
        Ok(((scored, ranked), stage))
    }

    /// Persist the report, by default as `orchestrator_results_<ts>.json`.
    pub fn save_report(&self, report: &RunReport, path: Option<&Path>) -> Result<PathBuf> {
        save_report(&self.config, report, path)
    }

    fn timestamp(&self) -> Result<String> {
        timestamp(&self.config)
    }

    fn artifact_path(&self, base: &str, stamp: &str) -> PathBuf {
        artifact_path(&self.config, base, stamp)
    }
}

/// Persist `report` under the configured output directory, or at `path`.
///
/// Usable before an [`Orchestrator`] exists, so a run that fails during
/// setup still leaves a report.
pub fn save_report(config: &PipelineConfig, report: &RunReport, path: Option<&Path>) -> Result<PathBuf> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => artifact_path(config, "orchestrator_results", &timestamp(config)?),
    };
    crate::write_json(&path, report)?;
    info!(path = ?path, "Run report saved");
    Ok(path)
}

fn timestamp(config: &PipelineConfig) -> Result<String> {
    let format = &config.output.timestamp_format;
    let mut stamp = String::new();
    write!(stamp, "{}", Local::now().format(format))
        .map_err(|_| PatentError::Config(format!("Invalid timestamp format '{}'", format)))?;
    Ok(stamp)
}

fn artifact_path(config: &PipelineConfig, base: &str, stamp: &str) -> PathBuf {
    config.output.base_dir.join(format!("{}_{}.json", base, stamp))
}

/// Record a stage outcome in the report; failures become [`PatentError::Stage`].
fn record<T>(report: &mut RunReport, stage: Stage, result: Result<(T, StageReport)>) -> Result<T> {
    match result {
        Ok((value, stage_report)) => {
            report.record_stage(stage.name(), stage_report);
            Ok(value)
        }
        Err(e) => {
            error!(stage = stage.name(), error = %e, "Stage failed");
            report.fail_stage(stage.name(), e.to_string());
            Err(PatentError::Stage {
                stage: stage.name().to_string(),
                message: e.to_string(),
            })
        }
    }
}
