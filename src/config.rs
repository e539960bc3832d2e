//! Pipeline configuration.
//!
//! Loaded from an optional JSON file; every field has a default so a partial
//! file (or none at all) is enough. CLI flags are applied on top by `main`.

use crate::error::{PatentError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub input: InputConfig,
    pub output: OutputConfig,
    pub fetcher: FetcherConfig,
    pub scorer: ScorerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Google Patents CSV export
    pub csv_file: PathBuf,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            csv_file: PathBuf::from("data/raw_search_results/gp_search_results.csv"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving every timestamped artifact
    pub base_dir: PathBuf,
    /// `chrono` format string used in artifact names
    pub timestamp_format: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("data/processed"),
            timestamp_format: "%Y%m%d_%H%M%S".to_string(),
        }
    }
}

/// Abstract resolution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Abstract store directory
    pub abstracts_dir: PathBuf,
    /// Pause after a freshly fetched record, in seconds
    pub delay_secs: f64,
    /// Pause after a cache hit, in seconds
    pub cached_delay_secs: f64,
    /// Time budget for one scrape, in seconds
    pub timeout_secs: f64,
    /// External scraper command line; the URL is appended as last argument.
    /// When unset the built-in HTTP scraper is used.
    pub scraper_command: Option<Vec<String>>,
    /// User agent for the built-in HTTP scraper
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            abstracts_dir: PathBuf::from("data/abstracts"),
            delay_secs: 2.0,
            cached_delay_secs: 0.5,
            timeout_secs: 30.0,
            scraper_command: None,
            user_agent: crate::scrape::DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FetcherConfig {
    pub fn delay(&self) -> Duration {
        secs(self.delay_secs)
    }

    pub fn cached_delay(&self) -> Duration {
        secs(self.cached_delay_secs)
    }

    pub fn timeout(&self) -> Duration {
        secs(self.timeout_secs)
    }
}

/// Negative or non-finite values collapse to zero.
fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    /// Keyword category file
    pub keywords_file: PathBuf,
    /// Number of top patents kept in the run summary
    pub top_n: usize,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            keywords_file: PathBuf::from("config/scoring_keywords.json"),
            top_n: 10,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PatentError::Config(format!("Cannot read config file {:?}: {}", path, e)))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| PatentError::Config(format!("Invalid config file {:?}: {}", path, e)))?;
        info!(path = ?path, "Loaded configuration");
        Ok(config)
    }

    /// Load from `path` when given, otherwise use defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.output.timestamp_format.trim().is_empty() {
            return Err(PatentError::Config("output.timestamp_format must not be empty".to_string()));
        }
        if self.fetcher.timeout().is_zero() {
            return Err(PatentError::Config("fetcher.timeout_secs must be positive".to_string()));
        }
        if matches!(&self.fetcher.scraper_command, Some(cmd) if cmd.is_empty()) {
            return Err(PatentError::Config("fetcher.scraper_command must not be empty".to_string()));
        }
        Ok(())
    }
}

/// A named research dataset: search export, keyword file and output
/// directory. Relative paths are resolved against the descriptor's own
/// directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub search_result_file: PathBuf,
    pub scoring_keywords_file: PathBuf,
    pub output_dir: PathBuf,
}

impl Dataset {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PatentError::Config(format!("Cannot read dataset file {:?}: {}", path, e)))?;
        let dataset: Self = serde_json::from_str(&content)
            .map_err(|e| PatentError::Config(format!("Invalid dataset file {:?}: {}", path, e)))?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Ok(Self {
            search_result_file: base.join(dataset.search_result_file),
            scoring_keywords_file: base.join(dataset.scoring_keywords_file),
            output_dir: base.join(dataset.output_dir),
        })
    }

    /// Point `config` at this dataset's files.
    pub fn apply(&self, config: &mut PipelineConfig) {
        config.input.csv_file = self.search_result_file.clone();
        config.scorer.keywords_file = self.scoring_keywords_file.clone();
        config.output.base_dir = self.output_dir.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.fetcher.delay(), Duration::from_secs(2));
        assert_eq!(config.fetcher.cached_delay(), Duration::from_millis(500));
        assert_eq!(config.fetcher.timeout(), Duration::from_secs(30));
        assert_eq!(config.output.timestamp_format, "%Y%m%d_%H%M%S");
        assert!(config.fetcher.scraper_command.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"output": {"base_dir": "out"}, "fetcher": {"delay_secs": 0, "scraper_command": ["python3", "get_abst_patent.py", "-i"]}}"#,
        )?;

        let config = PipelineConfig::load(Some(&path))?;
        assert_eq!(config.output.base_dir, PathBuf::from("out"));
        assert_eq!(config.output.timestamp_format, "%Y%m%d_%H%M%S");
        assert_eq!(config.fetcher.delay(), Duration::ZERO);
        assert_eq!(config.fetcher.timeout(), Duration::from_secs(30));
        assert_eq!(config.fetcher.scraper_command.as_ref().map(Vec::len), Some(3));
        Ok(())
    }

    #[test]
    fn test_invalid_file_is_config_error() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.json");
        std::fs::write(&path, "{ not json")?;
        assert!(matches!(PipelineConfig::from_file(&path), Err(PatentError::Config(_))));
        assert!(matches!(
            PipelineConfig::from_file(&temp.path().join("missing.json")),
            Err(PatentError::Config(_))
        ));
        Ok(())
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = PipelineConfig::default();
        config.fetcher.timeout_secs = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dataset_paths_resolve_against_descriptor() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("dataset.json");
        std::fs::write(
            &path,
            r#"{"search_result_file": "raw/gp.csv", "scoring_keywords_file": "kw.json", "output_dir": "/abs/out"}"#,
        )?;

        let dataset = Dataset::from_file(&path)?;
        assert_eq!(dataset.search_result_file, temp.path().join("raw/gp.csv"));
        assert_eq!(dataset.output_dir, PathBuf::from("/abs/out"));

        let mut config = PipelineConfig::default();
        dataset.apply(&mut config);
        assert_eq!(config.scorer.keywords_file, temp.path().join("kw.json"));
        assert_eq!(config.input.csv_file, dataset.search_result_file);
        Ok(())
    }
}
