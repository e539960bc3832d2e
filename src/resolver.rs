//! Abstract resolution with a durable per-patent cache.
//!
//! [`AbstractResolver::resolve`] returns the stored abstract for a patent when
//! one exists, and otherwise scrapes the patent page and stores the outcome,
//! success or failure. [`AbstractResolver::resolve_batch`] applies that to a
//! numbered window of validated records, pacing requests between records.
//!
//! Fetch failures are never raised. They end up in the store and in the
//! enriched record's `abstract_error` / `abstract_source`. Only store I/O
//! failures propagate.

use crate::config::FetcherConfig;
use crate::error::Result;
use crate::patent::{validate_records, AbstractSource, EnrichedPatentRecord, PatentRecord};
use crate::scrape::{AbstractScraper, ScrapeError};
use crate::store::{AbstractRecord, AbstractStore};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timing knobs for resolution
#[derive(Debug, Clone, Copy)]
pub struct ResolverSettings {
    /// Pause after a record that needed a fetch
    pub delay: Duration,
    /// Pause after a cache hit
    pub cached_delay: Duration,
    /// Time budget for one scrape
    pub timeout: Duration,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self::from(&FetcherConfig::default())
    }
}

impl From<&FetcherConfig> for ResolverSettings {
    fn from(config: &FetcherConfig) -> Self {
        Self {
            delay: config.delay(),
            cached_delay: config.cached_delay(),
            timeout: config.timeout(),
        }
    }
}

/// 1-based window over a validated record list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchWindow {
    /// First record, 1-based
    pub start: usize,
    /// Number of records; `None` runs through the end
    pub size: Option<usize>,
}

impl Default for BatchWindow {
    fn default() -> Self {
        Self { start: 1, size: None }
    }
}

impl BatchWindow {
    pub fn new(start: usize, size: Option<usize>) -> Self {
        Self { start, size }
    }

    /// Half-open index range `[start-1, start-1+size)` clamped to `len`.
    pub fn range(&self, len: usize) -> std::ops::Range<usize> {
        let begin = self.start.saturating_sub(1).min(len);
        let end = match self.size {
            Some(size) => begin.saturating_add(size).min(len),
            None => len,
        };
        begin..end
    }
}

/// Counters for one batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    /// Records in the window
    pub total: usize,
    /// Records that needed a fetch attempt
    pub processed: usize,
    /// Cache hits
    pub skipped: usize,
    /// Attempts that ended in a stored failure
    pub failed: usize,
    /// Records dropped by validation before windowing
    pub invalid: usize,
}

/// Enriched window plus counters
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub records: Vec<EnrichedPatentRecord>,
    pub stats: BatchStats,
}

/// Resolves abstracts through the store, falling back to a scraper
pub struct AbstractResolver<S> {
    store: AbstractStore,
    scraper: S,
    settings: ResolverSettings,
}

impl<S: AbstractScraper> AbstractResolver<S> {
    pub fn new(store: AbstractStore, scraper: S, settings: ResolverSettings) -> Self {
        Self {
            store,
            scraper,
            settings,
        }
    }

    pub fn store(&self) -> &AbstractStore {
        &self.store
    }

    /// Resolve the abstract for one validated record.
    ///
    /// # Errors
    ///
    /// Only store read/write failures are returned; scrape failures are
    /// stored and reported through the enriched record.
    pub async fn resolve(&self, record: &PatentRecord) -> Result<EnrichedPatentRecord> {
        let previous = self.store.load(&record.id)?;

        if let Some(stored) = previous.as_ref().filter(|p| p.has_abstract()) {
            info!(id = %record.id, "Using cached abstract");
            return Ok(EnrichedPatentRecord::from_abstract(
                record.clone(),
                stored,
                AbstractSource::CachedFile,
            ));
        }

        let retry_count = previous.as_ref().map(|p| p.retry_count.saturating_add(1)).unwrap_or(0);

        let outcome = match tokio::time::timeout(self.settings.timeout, self.scraper.scrape(&record.result_link)).await
        {
            Ok(result) => result,
            Err(_) => Err(ScrapeError::Timeout),
        };

        let (stored, source) = match outcome {
            Ok(scraped) => {
                info!(id = %record.id, has_abstract = scraped.abstract_text.is_some(), "Fetched abstract");
                let stored = AbstractRecord {
                    id: record.id.clone(),
                    title: scraped.title,
                    abstract_text: scraped.abstract_text,
                    url: Some(record.result_link.clone()),
                    error: None,
                    retry_count,
                };
                (stored, AbstractSource::NewlyFetched)
            }
            Err(e) => {
                let source = match e {
                    ScrapeError::Failed(_) => AbstractSource::ErrorSaved,
                    ScrapeError::Timeout => AbstractSource::TimeoutSaved,
                    ScrapeError::Other(_) => AbstractSource::ExceptionSaved,
                };
                warn!(id = %record.id, url = %record.result_link, source = ?source, error = %e, "Abstract fetch failed");
                (
                    AbstractRecord::failed(&record.id, &record.result_link, e.to_string(), retry_count),
                    source,
                )
            }
        };

        self.store.save(&record.id, &stored)?;
        Ok(EnrichedPatentRecord::from_abstract(record.clone(), &stored, source))
    }

    /// Validate `records`, then resolve the records inside `window` in order.
    ///
    /// Records outside the window are not touched.
    pub async fn resolve_batch(&self, records: &[PatentRecord], window: BatchWindow) -> Result<BatchOutcome> {
        let (valid, invalid) = validate_records(records);
        let range = window.range(valid.len());
        let selected = &valid[range.clone()];

        info!(
            valid = valid.len(),
            invalid = invalid,
            start = range.start + 1,
            end = range.end,
            "Resolving abstracts"
        );

        let mut stats = BatchStats {
            total: selected.len(),
            invalid,
            ..Default::default()
        };
        let mut enriched = Vec::with_capacity(selected.len());

        for (offset, record) in selected.iter().enumerate() {
            debug!(
                position = range.start + offset + 1,
                of = valid.len(),
                id = %record.id,
                "Resolving record"
            );

            let result = self.resolve(record).await?;
            let cached = result.abstract_source == AbstractSource::CachedFile;
            if cached {
                stats.skipped += 1;
            } else {
                stats.processed += 1;
                if result.abstract_error.is_some() {
                    stats.failed += 1;
                }
            }
            enriched.push(result);

            if offset + 1 < selected.len() {
                let pause = if cached {
                    self.settings.cached_delay
                } else {
                    self.settings.delay
                };
                if !pause.is_zero() {
                    tokio::time::sleep(pause).await;
                }
            }
        }

        info!(
            total = stats.total,
            processed = stats.processed,
            skipped = stats.skipped,
            failed = stats.failed,
            "Abstract resolution completed"
        );

        Ok(BatchOutcome {
            records: enriched,
            stats,
        })
    }
}

/// Enrich every record as skipped, without touching the store or network.
pub fn skipped_batch(records: &[PatentRecord]) -> Vec<EnrichedPatentRecord> {
    info!(count = records.len(), "Skipping abstract fetching");
    records.iter().cloned().map(EnrichedPatentRecord::skipped).collect()
}
