//! Patent search-result records and boundary validation.
//!
//! A [`PatentRecord`] is one row of a Google Patents CSV export. Records are
//! validated once, before they reach the abstract resolver: both the `id`
//! and the `result_link` must be present and the link must point at a
//! patent detail page on `patents.google.com`.

use crate::store::AbstractRecord;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

/// Host every `result_link` must point at
pub const PATENT_HOST: &str = "patents.google.com";

/// Path segment identifying a patent detail page
const PATENT_PATH_MARKER: &str = "/patent/";

/// One row of the search-result export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PatentRecord {
    /// Publication number, e.g. `US-9254383-B2`
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub assignee: String,
    #[serde(default)]
    pub inventors: String,
    #[serde(default)]
    pub priority_date: String,
    #[serde(default)]
    pub filing_date: String,
    #[serde(default)]
    pub publication_date: String,
    #[serde(default)]
    pub grant_date: String,
    /// Link to the patent detail page
    #[serde(default)]
    pub result_link: String,
}

impl PatentRecord {
    /// Check the record can be handed to the abstract resolver.
    pub fn is_valid(&self) -> bool {
        !self.id.trim().is_empty() && !self.result_link.trim().is_empty() && is_patent_url(&self.result_link)
    }
}

/// Where the abstract fields of an [`EnrichedPatentRecord`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbstractSource {
    /// Final abstract already in the store, no fetch
    CachedFile,
    /// Fetched in this run and stored
    NewlyFetched,
    /// Scraper reported failure; failure stored
    ErrorSaved,
    /// Scrape timed out; failure stored
    TimeoutSaved,
    /// Scrape failed unexpectedly; failure stored
    ExceptionSaved,
    /// Joined from the store by the merger
    IntegratedFromFile,
    /// No store entry for this id
    NotFound,
    /// Abstract fetching was turned off for the run
    Skipped,
}

/// Error text for records without a store entry
pub const NOT_FOUND_ERROR: &str = "Abstract file not found";

/// Error text for records whose fetch was turned off
pub const SKIPPED_ERROR: &str = "Skipped by --skip-abstract-fetch";

/// A patent record with its abstract resolution result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedPatentRecord {
    #[serde(flatten)]
    pub patent: PatentRecord,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub abstract_title: Option<String>,
    pub abstract_url: Option<String>,
    pub abstract_error: Option<String>,
    #[serde(default)]
    pub abstract_retry_count: u32,
    pub abstract_source: AbstractSource,
}

impl EnrichedPatentRecord {
    /// Copy the abstract fields of a stored record.
    pub fn from_abstract(patent: PatentRecord, stored: &AbstractRecord, source: AbstractSource) -> Self {
        Self {
            patent,
            abstract_text: stored.abstract_text.clone(),
            abstract_title: stored.title.clone(),
            abstract_url: stored.url.clone(),
            abstract_error: stored.error.clone(),
            abstract_retry_count: stored.retry_count,
            abstract_source: source,
        }
    }

    /// Empty abstract fields with an explanatory error.
    pub fn without_abstract(patent: PatentRecord, error: &str, source: AbstractSource) -> Self {
        Self {
            patent,
            abstract_text: None,
            abstract_title: None,
            abstract_url: None,
            abstract_error: Some(error.to_string()),
            abstract_retry_count: 0,
            abstract_source: source,
        }
    }

    pub fn not_found(patent: PatentRecord) -> Self {
        Self::without_abstract(patent, NOT_FOUND_ERROR, AbstractSource::NotFound)
    }

    pub fn skipped(patent: PatentRecord) -> Self {
        Self::without_abstract(patent, SKIPPED_ERROR, AbstractSource::Skipped)
    }

    pub fn id(&self) -> &str {
        &self.patent.id
    }

    /// True when a non-blank abstract is attached.
    pub fn has_abstract(&self) -> bool {
        self.abstract_text.as_deref().is_some_and(|a| !a.trim().is_empty())
    }
}

/// Check that `url` is an http(s) link to a patent detail page.
pub fn is_patent_url(url: &str) -> bool {
    match Url::parse(url.trim()) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https")
                && parsed.host_str() == Some(PATENT_HOST)
                && parsed.port().is_none()
                && parsed.username().is_empty()
                && parsed.password().is_none()
                && parsed.path().contains(PATENT_PATH_MARKER)
        }
        Err(e) => {
            debug!(url = url, error = %e, "Unparsable result link");
            false
        }
    }
}

/// Split records into the valid ones, in input order, and a count of dropped ones.
///
/// Every dropped record is logged as a warning.
pub fn validate_records(records: &[PatentRecord]) -> (Vec<PatentRecord>, usize) {
    let mut valid = Vec::with_capacity(records.len());
    let mut invalid = 0usize;

    for record in records {
        if record.is_valid() {
            valid.push(record.clone());
        } else {
            invalid += 1;
            let id = if record.id.is_empty() { "Unknown" } else { record.id.as_str() };
            warn!(id = id, link = %record.result_link, "Invalid patent record");
        }
    }

    if invalid > 0 {
        warn!(count = invalid, "Skipped invalid patent records");
    }

    (valid, invalid)
}

/// Load a JSON array of patent records.
pub fn load_records(path: &std::path::Path) -> crate::Result<Vec<PatentRecord>> {
    let content = std::fs::read_to_string(path)?;
    let records: Vec<PatentRecord> = serde_json::from_str(&content)?;
    debug!(path = ?path, count = records.len(), "Loaded patent records");
    Ok(records)
}
