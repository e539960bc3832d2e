//! # patentinsight
//!
//! Patent research pipeline: Google Patents CSV export to scored JSON.
//!
//! ## Modules
//!
//! - [`convert`] - CSV export to patent records
//! - [`store`] - Per-patent abstract cache on disk
//! - [`scrape`] - Abstract scrapers (built-in HTTP, external command)
//! - [`resolver`] - Cached, paced abstract resolution over a batch window
//! - [`merge`] - Left join of records with the abstract store
//! - [`scorer`] - Keyword relevance scoring and ranking
//! - [`orchestrator`] - Stage sequencing and the run report
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use patentinsight::config::PipelineConfig;
//! use patentinsight::orchestrator::{Orchestrator, RunOptions};
//! use patentinsight::report::RunReport;
//! use patentinsight::scrape::Scraper;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::default();
//!     let scraper = Scraper::from_config(&config.fetcher)?;
//!     let orchestrator = Orchestrator::new(config, scraper, RunOptions::default())?;
//!
//!     let mut report = RunReport::new();
//!     orchestrator.run(&mut report).await?;
//!     println!("{:?}", report.final_results);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod convert;
pub mod error;
pub mod merge;
pub mod orchestrator;
pub mod patent;
pub mod report;
pub mod resolver;
pub mod scorer;
pub mod scrape;
pub mod store;

pub use error::{PatentError, Result};

use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Write `value` as pretty-printed UTF-8 JSON with a trailing newline.
/// Non-ASCII text is written as-is.
///
/// The content goes to a temp file in the target directory which is then
/// renamed over `path`, so an interrupted write never leaves a truncated
/// file behind.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            std::fs::create_dir_all(parent)?;
            parent
        }
        None => Path::new("."),
    };
    let mut content = serde_json::to_string_pretty(value)?;
    content.push('\n');

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(content.as_bytes())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_json_keeps_unicode() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested/out.json");
        write_json(&path, &vec!["Gerät", "装置"])?;

        let content = std::fs::read_to_string(&path)?;
        assert!(content.contains("Gerät"));
        assert!(content.contains("装置"));
        assert!(content.ends_with("]\n"));
        Ok(())
    }

    #[test]
    fn test_failed_write_keeps_previous_file() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("US-1-B2.json");
        write_json(&path, &vec!["first"])?;

        // Non-string map keys cannot be serialized to JSON
        let mut bad = std::collections::BTreeMap::new();
        bad.insert((1u8, 2u8), "value");
        assert!(write_json(&path, &bad).is_err());

        assert_eq!(std::fs::read_to_string(&path)?, "[\n  \"first\"\n]\n");
        let leftovers: Vec<_> = std::fs::read_dir(temp.path())?.collect();
        assert_eq!(leftovers.len(), 1, "no temp files left behind");
        Ok(())
    }

    #[test]
    fn test_write_replaces_existing_file() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("out.json");
        write_json(&path, &vec!["a much longer first version of the content"])?;
        write_json(&path, &vec!["b"])?;
        assert_eq!(std::fs::read_to_string(&path)?, "[\n  \"b\"\n]\n");
        Ok(())
    }
}
