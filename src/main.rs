//! patentinsight - Patent research pipeline
//!
//! Converts a Google Patents CSV export to JSON, resolves abstracts through a
//! local cache, merges them back and scores every patent against a keyword
//! list.
//!
//! ## Usage
//!
//! ### Full pipeline
//! ```bash
//! patentinsight run --input data/raw_search_results/gp_search_results.csv
//! ```
//!
//! ### As an external scraper for another run
//! ```bash
//! patentinsight scrape https://patents.google.com/patent/US9254383B2/en
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use patentinsight::config::{Dataset, PipelineConfig};
use patentinsight::merge::{merge, merge_stats};
use patentinsight::orchestrator::{save_report, Orchestrator, RunOptions, Stage};
use patentinsight::patent::{load_records, EnrichedPatentRecord};
use patentinsight::report::{RunReport, HIGH_RELEVANCE, MEDIUM_RELEVANCE};
use patentinsight::resolver::{AbstractResolver, BatchWindow, ResolverSettings};
use patentinsight::scorer::{rank, sort_scored_file, statistics, RelevanceScorer};
use patentinsight::scrape::{AbstractScraper, HttpScraper, Scraper, DEFAULT_USER_AGENT};
use patentinsight::store::AbstractStore;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Patent research pipeline
#[derive(Parser)]
#[command(name = "patentinsight")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the whole pipeline
    Run {
        /// Input CSV file (Google Patents export)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Scoring keywords file
        #[arg(long)]
        scoring_keywords: Option<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Run the pipeline for a dataset descriptor
    Dataset {
        /// Dataset descriptor (JSON)
        file: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Scrape one patent page and print its abstract as JSON
    Scrape {
        /// Patent detail URL
        url: String,

        /// Request timeout in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,
    },

    /// Resolve abstracts for a window of patent records
    Fetch {
        /// Patent records (JSON array)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// First record to fetch (1-based)
        #[arg(long, default_value = "1")]
        start_number: usize,

        /// Number of records to fetch (default: all)
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Merge patent records with the abstract store
    Merge {
        /// Patent records (JSON array)
        #[arg(short, long)]
        input: PathBuf,

        /// Abstract store directory
        #[arg(long, default_value = "data/abstracts")]
        abstracts_dir: PathBuf,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Score merged records against a keyword file
    Score {
        /// Merged records (JSON array)
        #[arg(short, long)]
        input: PathBuf,

        /// Scoring keywords file
        #[arg(long, default_value = "config/scoring_keywords.json")]
        scoring_keywords: PathBuf,

        /// Output file (ranked)
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Rank an existing scored file
    Sort {
        /// Scored records (JSON array)
        input: PathBuf,

        /// Output file (default: <input>_sorted.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Options shared by `run` and `dataset`
#[derive(Args)]
struct RunArgs {
    /// Configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// First record to fetch (1-based)
    #[arg(long, default_value = "1")]
    start_number: usize,

    /// Number of records to fetch (default: all)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Skip abstract fetching; every record is marked skipped
    #[arg(long)]
    skip_abstract_fetch: bool,

    /// Stop after this stage
    #[arg(long, default_value = "relevance-scoring", value_parser = ["csv-to-json", "abstract-fetch", "abstract-integration", "relevance-scoring"])]
    until: String,

    /// Number of top patents in the summary
    #[arg(long)]
    top_n: Option<usize>,

    /// Where to write the run report (default: <output>/orchestrator_results_<ts>.json)
    #[arg(long)]
    report: Option<PathBuf>,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            input,
            scoring_keywords,
            output,
            run,
        } => {
            let mut config = PipelineConfig::load(run.config.as_deref())?;
            if let Some(input) = input {
                config.input.csv_file = input;
            }
            if let Some(keywords) = scoring_keywords {
                config.scorer.keywords_file = keywords;
            }
            if let Some(output) = output {
                config.output.base_dir = output;
            }
            run_pipeline(config, run).await
        }
        Commands::Dataset { file, run } => {
            let dataset = Dataset::from_file(&file)?;
            let mut config = PipelineConfig::load(run.config.as_deref())?;
            dataset.apply(&mut config);
            info!(dataset = ?file, "Running dataset");
            run_pipeline(config, run).await
        }
        Commands::Scrape { url, timeout } => run_scrape(&url, timeout).await,
        Commands::Fetch {
            input,
            output,
            config,
            start_number,
            batch_size,
        } => {
            let config = PipelineConfig::load(config.as_deref())?;
            run_fetch(&config, &input, &output, BatchWindow::new(start_number, batch_size)).await
        }
        Commands::Merge {
            input,
            abstracts_dir,
            output,
        } => run_merge(&input, &abstracts_dir, &output),
        Commands::Score {
            input,
            scoring_keywords,
            output,
        } => run_score(&input, &scoring_keywords, &output),
        Commands::Sort { input, output } => {
            let path = sort_scored_file(&input, output.as_deref())?;
            println!("Saved: {}", path.display());
            Ok(())
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

async fn run_pipeline(mut config: PipelineConfig, args: RunArgs) -> Result<()> {
    if let Some(top_n) = args.top_n {
        config.scorer.top_n = top_n;
    }
    let options = RunOptions {
        window: BatchWindow::new(args.start_number, args.batch_size),
        skip_abstract_fetch: args.skip_abstract_fetch,
        until: Stage::from_name(&args.until)?,
    };

    let mut report = RunReport::new();
    let setup = Scraper::from_config(&config.fetcher)
        .and_then(|scraper| Orchestrator::new(config.clone(), scraper, options));

    let result = match setup {
        Ok(orchestrator) => orchestrator.run(&mut report).await,
        Err(e) => {
            report.abort(e.to_string());
            Err(e)
        }
    };

    // The report is saved whether or not the run succeeded
    let report_path = save_report(&config, &report, args.report.as_deref()).context("Failed to save run report")?;

    print_summary(&report);
    println!("\nRun report: {}", report_path.display());

    if let Err(e) = result {
        error!(error = %e, "Pipeline failed");
        anyhow::bail!("Pipeline failed: {}", e);
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    println!("\n--- Pipeline Summary ---");
    println!("Status: {:?}", report.status);
    if let Some(duration) = report.duration_secs {
        println!("Duration: {:.2}s", duration);
    }

    for (name, stage) in &report.stages {
        println!(
            "  {}: {:?} ({} processed, {} matched, {} errors)",
            name, stage.status, stage.processed_count, stage.matched_count, stage.error_count
        );
    }

    if let Some(results) = &report.final_results {
        println!("\nTotal patents: {}", results.total_patents);
        println!("High relevance (>= {}): {}", HIGH_RELEVANCE, results.high_relevance_count);
        println!(
            "Medium relevance ({}-{}): {}",
            MEDIUM_RELEVANCE,
            HIGH_RELEVANCE - 1,
            results.medium_relevance_count
        );
        println!("Low relevance (< {}): {}", MEDIUM_RELEVANCE, results.low_relevance_count);
        if results.undefined_score_count > 0 {
            println!("Undefined score: {}", results.undefined_score_count);
        }

        if !results.top_patents.is_empty() {
            println!("\nTop patents:");
            for top in &results.top_patents {
                println!("  {}. [{}] {} - {}", top.ranking, top.relevance_score, top.patent_id, top.title);
            }
        }
    }

    for warning in &report.warnings {
        println!("Warning: {}", warning);
    }
    for err in &report.errors {
        println!("Error: {}", err);
    }
}

// ============================================================================
// Single-step commands
// ============================================================================

async fn run_scrape(url: &str, timeout: u64) -> Result<()> {
    let scraper = HttpScraper::new(DEFAULT_USER_AGENT, Duration::from_secs(timeout))?;

    match scraper.scrape(url).await {
        Ok(scraped) => {
            println!("{}", serde_json::to_string_pretty(&scraped)?);
            Ok(())
        }
        Err(e) => {
            // Non-zero exit tells a calling pipeline the fetch failed
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

async fn run_fetch(config: &PipelineConfig, input: &Path, output: &Path, window: BatchWindow) -> Result<()> {
    config.validate()?;
    let patents = load_records(input).with_context(|| format!("Failed to load {}", input.display()))?;

    let store = AbstractStore::open(&config.fetcher.abstracts_dir)?;
    let scraper = Scraper::from_config(&config.fetcher)?;
    let resolver = AbstractResolver::new(store, scraper, ResolverSettings::from(&config.fetcher));

    let outcome = resolver.resolve_batch(&patents, window).await?;
    patentinsight::write_json(output, &outcome.records)?;

    let stats = outcome.stats;
    println!(
        "Resolved {} records: {} fetched ({} failed), {} cached, {} invalid",
        stats.total, stats.processed, stats.failed, stats.skipped, stats.invalid
    );
    println!("Saved: {}", output.display());
    Ok(())
}

fn run_merge(input: &Path, abstracts_dir: &Path, output: &Path) -> Result<()> {
    let patents = load_records(input).with_context(|| format!("Failed to load {}", input.display()))?;
    let merged = merge(&patents, abstracts_dir)?;
    patentinsight::write_json(output, &merged)?;

    let stats = merge_stats(&merged);
    println!(
        "Merged {} records: {} with abstract, {} without ({} stored errors)",
        stats.processed, stats.matched, stats.unmatched, stats.error_count
    );
    println!("Saved: {}", output.display());
    Ok(())
}

fn run_score(input: &Path, keywords: &Path, output: &Path) -> Result<()> {
    let content = std::fs::read_to_string(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let records: Vec<EnrichedPatentRecord> = serde_json::from_str(&content).context("Invalid merged records")?;

    let scorer = RelevanceScorer::from_file(keywords)?;
    let scored = scorer.score_all(&records);
    let ranked = rank(&scored);
    patentinsight::write_json(output, &ranked)?;

    match statistics(&scored) {
        Some(stats) => println!(
            "Scored {} patents: max {}, min {}, average {:.2}, {} high, {} zero",
            stats.total_patents,
            stats.max_score,
            stats.min_score,
            stats.average_score,
            stats.high_score_count,
            stats.zero_score_count
        ),
        None => println!("No patents with a defined score"),
    }
    println!("Saved: {}", output.display());
    Ok(())
}
