//! Left join of patent records with the abstract store.
//!
//! Unlike the resolver, merging never fetches: it reads whatever the store
//! directory currently holds, keyed by file base name. Output order follows
//! input order, so merging the same inputs twice produces identical bytes.

use crate::error::Result;
use crate::patent::{AbstractSource, EnrichedPatentRecord, PatentRecord};
use crate::store::{read_entry, AbstractStore};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

/// Join counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    /// Records joined
    pub processed: usize,
    /// Records with a non-blank abstract
    pub matched: usize,
    /// Records without one
    pub unmatched: usize,
    /// Joined store entries carrying a fetch error
    pub error_count: usize,
}

/// Join every record with its store entry, or a not-found placeholder.
///
/// # Errors
///
/// Fails when the store directory cannot be listed or an entry cannot be
/// read or parsed.
pub fn merge(patents: &[PatentRecord], store_dir: &Path) -> Result<Vec<EnrichedPatentRecord>> {
    if !store_dir.exists() {
        warn!(dir = ?store_dir, "Abstract store directory not found, creating it");
    }
    let store = AbstractStore::open(store_dir)?;
    let index = store.index()?;
    info!(patents = patents.len(), entries = index.len(), "Integrating abstracts");

    let mut merged = Vec::with_capacity(patents.len());
    for patent in patents {
        let enriched = match index.get(&patent.id) {
            Some(path) => {
                let stored = read_entry(path)?;
                EnrichedPatentRecord::from_abstract(patent.clone(), &stored, AbstractSource::IntegratedFromFile)
            }
            None => {
                debug!(id = %patent.id, "No abstract file");
                EnrichedPatentRecord::not_found(patent.clone())
            }
        };
        merged.push(enriched);
    }

    let stats = merge_stats(&merged);
    info!(
        processed = stats.processed,
        matched = stats.matched,
        unmatched = stats.unmatched,
        "Abstract integration completed"
    );
    Ok(merged)
}

/// Count matched/unmatched records in a merged list.
pub fn merge_stats(merged: &[EnrichedPatentRecord]) -> MergeStats {
    let matched = merged.iter().filter(|r| r.has_abstract()).count();
    let error_count = merged
        .iter()
        .filter(|r| r.abstract_source == AbstractSource::IntegratedFromFile && r.abstract_error.is_some())
        .count();

    MergeStats {
        processed: merged.len(),
        matched,
        unmatched: merged.len() - matched,
        error_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::AbstractRecord;

    fn patent(id: &str) -> PatentRecord {
        PatentRecord {
            id: id.to_string(),
            title: format!("Title of {}", id),
            result_link: format!("https://patents.google.com/patent/{}/en", id),
            ..Default::default()
        }
    }

    fn seeded_store(dir: &Path) -> Result<AbstractStore> {
        let store = AbstractStore::open(dir)?;
        store.save(
            "US-1-B2",
            &AbstractRecord {
                id: "US-1-B2".to_string(),
                title: Some("Widget".to_string()),
                abstract_text: Some("Ein Gerät zur Messung.".to_string()),
                url: Some("https://patents.google.com/patent/US1B2/en".to_string()),
                error: None,
                retry_count: 1,
            },
        )?;
        store.save(
            "US-3-B2",
            &AbstractRecord::failed("US-3-B2", "https://patents.google.com/patent/US3B2/en", "HTTP error: 503", 0),
        )?;
        Ok(store)
    }

    #[test]
    fn test_merge_left_join() -> Result<()> {
        let temp = tempfile::tempdir()?;
        seeded_store(temp.path())?;
        let patents = vec![patent("US-1-B2"), patent("US-2-B2"), patent("US-3-B2")];

        let merged = merge(&patents, temp.path())?;

        let ids: Vec<&str> = merged.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["US-1-B2", "US-2-B2", "US-3-B2"]);

        assert_eq!(merged[0].abstract_source, AbstractSource::IntegratedFromFile);
        assert_eq!(merged[0].abstract_text.as_deref(), Some("Ein Gerät zur Messung."));
        assert_eq!(merged[0].abstract_title.as_deref(), Some("Widget"));
        assert_eq!(merged[0].abstract_retry_count, 1);

        let missing = &merged[1];
        assert_eq!(missing.abstract_source, AbstractSource::NotFound);
        assert_eq!(missing.abstract_error.as_deref(), Some("Abstract file not found"));
        assert!(missing.abstract_text.is_none());
        assert!(missing.abstract_title.is_none());
        assert!(missing.abstract_url.is_none());
        assert_eq!(missing.abstract_retry_count, 0);

        assert_eq!(merged[2].abstract_error.as_deref(), Some("HTTP error: 503"));

        let stats = merge_stats(&merged);
        assert_eq!(
            stats,
            MergeStats {
                processed: 3,
                matched: 1,
                unmatched: 2,
                error_count: 1
            }
        );
        Ok(())
    }

    #[test]
    fn test_merge_is_idempotent() -> Result<()> {
        let temp = tempfile::tempdir()?;
        seeded_store(temp.path())?;
        let patents = vec![patent("US-3-B2"), patent("US-1-B2"), patent("US-9-B2")];

        let first = serde_json::to_string_pretty(&merge(&patents, temp.path())?)?;
        let second = serde_json::to_string_pretty(&merge(&patents, temp.path())?)?;
        assert_eq!(first, second);
        assert!(first.contains("Gerät"), "non-ASCII must stay unescaped");
        Ok(())
    }

    #[test]
    fn test_merge_creates_missing_store() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let dir = temp.path().join("abstracts");
        let merged = merge(&[patent("US-1-B2")], &dir)?;
        assert!(dir.is_dir());
        assert_eq!(merged[0].abstract_source, AbstractSource::NotFound);
        Ok(())
    }

    #[test]
    fn test_merge_fails_on_corrupt_entry() -> Result<()> {
        let temp = tempfile::tempdir()?;
        std::fs::write(temp.path().join("US-1-B2.json"), "{ broken")?;
        assert!(merge(&[patent("US-1-B2")], temp.path()).is_err());
        Ok(())
    }
}
