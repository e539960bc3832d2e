//! Keyword-based relevance scoring.
//!
//! A record's score is the sum, over keyword categories, of the number of
//! distinct category keywords found in `"{title} {abstract}"` times the
//! category weight. Matching is case-insensitive substring matching; repeated
//! occurrences of one keyword count once.

use crate::error::{PatentError, Result};
use crate::patent::EnrichedPatentRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Score at or above which a patent counts as high-scoring in statistics
const HIGH_SCORE_THRESHOLD: u64 = 20;

/// One weighted keyword category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordCategory {
    #[serde(default = "default_category_name")]
    pub name: String,
    /// Weight per matched keyword
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub keywords: Vec<String>,
}

fn default_category_name() -> String {
    "Unknown".to_string()
}

/// Keyword file contents
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KeywordConfig {
    #[serde(default)]
    pub keyword_categories: Vec<KeywordCategory>,
}

impl KeywordConfig {
    /// Load a keyword file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PatentError::Config(format!("Cannot read keywords file {:?}: {}", path, e)))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| PatentError::Config(format!("Invalid keywords file {:?}: {}", path, e)))?;
        info!(path = ?path, categories = config.keyword_categories.len(), "Loaded keyword configuration");
        Ok(config)
    }
}

/// An enriched record with its relevance score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredRecord {
    #[serde(flatten)]
    pub record: EnrichedPatentRecord,
    /// `None` when the score is undefined (overflow or negative total)
    pub relevance_score: Option<u64>,
}

/// Summary of defined scores
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreStatistics {
    pub total_patents: usize,
    pub max_score: u64,
    pub min_score: u64,
    pub average_score: f64,
    pub zero_score_count: usize,
    pub high_score_count: usize,
}

/// Category with its keywords lowercased and deduplicated
#[derive(Debug, Clone)]
struct PreparedCategory {
    name: String,
    weight: i64,
    keywords: BTreeSet<String>,
}

/// Scores enriched records against a keyword configuration
#[derive(Debug, Clone)]
pub struct RelevanceScorer {
    categories: Vec<PreparedCategory>,
}

impl RelevanceScorer {
    pub fn new(config: &KeywordConfig) -> Self {
        let categories = config
            .keyword_categories
            .iter()
            .map(|c| PreparedCategory {
                name: c.name.clone(),
                weight: c.score,
                keywords: c
                    .keywords
                    .iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect(),
            })
            .collect();
        Self { categories }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::new(&KeywordConfig::from_file(path)?))
    }

    /// Score for one record, `None` when undefined.
    pub fn score_record(&self, record: &EnrichedPatentRecord) -> Option<u64> {
        let text = format!(
            "{} {}",
            record.patent.title,
            record.abstract_text.as_deref().unwrap_or("")
        )
        .to_lowercase();

        let mut total: i64 = 0;
        for category in &self.categories {
            let matched: Vec<&str> = category
                .keywords
                .iter()
                .filter(|k| text.contains(k.as_str()))
                .map(String::as_str)
                .collect();
            if matched.is_empty() {
                continue;
            }

            let category_total = i64::try_from(matched.len()).ok()?.checked_mul(category.weight)?;
            total = total.checked_add(category_total)?;
            debug!(
                id = %record.patent.id,
                category = %category.name,
                keywords = ?matched,
                score = category_total,
                "Category matched"
            );
        }

        u64::try_from(total).ok()
    }

    /// Score every record, keeping input order and undefined scores.
    pub fn score_all(&self, records: &[EnrichedPatentRecord]) -> Vec<ScoredRecord> {
        info!(count = records.len(), "Calculating relevance scores");
        records
            .iter()
            .map(|r| ScoredRecord {
                relevance_score: self.score_record(r),
                record: r.clone(),
            })
            .collect()
    }

    /// Score and rank in one step.
    pub fn score(&self, records: &[EnrichedPatentRecord]) -> Vec<ScoredRecord> {
        rank(&self.score_all(records))
    }
}

/// Records with a defined score, highest first; ties keep input order.
pub fn rank(scored: &[ScoredRecord]) -> Vec<ScoredRecord> {
    let mut ranked: Vec<ScoredRecord> = scored.iter().filter(|r| r.relevance_score.is_some()).cloned().collect();
    ranked.sort_by(|a, b| b.relevance_score.cmp(&a.relevance_score));
    ranked
}

/// Statistics over defined scores; `None` when there are none.
pub fn statistics(scored: &[ScoredRecord]) -> Option<ScoreStatistics> {
    let scores: Vec<u64> = scored.iter().filter_map(|r| r.relevance_score).collect();
    let max_score = *scores.iter().max()?;
    let min_score = *scores.iter().min()?;
    let sum: u64 = scores.iter().fold(0u64, |acc, s| acc.saturating_add(*s));

    Some(ScoreStatistics {
        total_patents: scores.len(),
        max_score,
        min_score,
        average_score: sum as f64 / scores.len() as f64,
        zero_score_count: scores.iter().filter(|s| **s == 0).count(),
        high_score_count: scores.iter().filter(|s| **s >= HIGH_SCORE_THRESHOLD).count(),
    })
}

/// Write the ranked version of a scored file.
///
/// Defaults to `<stem>_sorted.<ext>` next to the input.
pub fn sort_scored_file(input: &Path, output: Option<&Path>) -> Result<PathBuf> {
    let content = std::fs::read_to_string(input)?;
    let scored: Vec<ScoredRecord> = serde_json::from_str(&content)?;
    let ranked = rank(&scored);

    let output = match output {
        Some(p) => p.to_path_buf(),
        None => sorted_path(input),
    };
    crate::write_json(&output, &ranked)?;

    info!(
        output = ?output,
        total = scored.len(),
        valid = ranked.len(),
        "Sorted scored file created"
    );
    Ok(output)
}

fn sorted_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("scored_patents");
    let file_name = match input.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}_sorted.{}", stem, ext),
        None => format!("{}_sorted", stem),
    };
    input.with_file_name(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patent::PatentRecord;

    fn enriched(id: &str, title: &str, abstract_text: Option<&str>) -> EnrichedPatentRecord {
        let patent = PatentRecord {
            id: id.to_string(),
            title: title.to_string(),
            ..Default::default()
        };
        let mut record = EnrichedPatentRecord::not_found(patent);
        record.abstract_text = abstract_text.map(str::to_string);
        record
    }

    fn category(name: &str, score: i64, keywords: &[&str]) -> KeywordCategory {
        KeywordCategory {
            name: name.to_string(),
            score,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    fn scorer(categories: Vec<KeywordCategory>) -> RelevanceScorer {
        RelevanceScorer::new(&KeywordConfig {
            keyword_categories: categories,
        })
    }

    #[test]
    fn test_distinct_keywords_count_once() {
        let scorer = scorer(vec![category("AI", 5, &["neural", "learning"])]);
        let record = enriched(
            "US-1-B2",
            "Neural network",
            Some("Deep learning method. The learning rate is adapted."),
        );
        assert_eq!(scorer.score_record(&record), Some(10));
    }

    #[test]
    fn test_categories_add_up() {
        let scorer = scorer(vec![
            category("AI", 5, &["neural"]),
            category("Robotics", 3, &["ROBOT", "gripper", "arm"]),
        ]);
        let record = enriched("US-1-B2", "Robot arm", Some("A neural controller for a robot."));
        assert_eq!(scorer.score_record(&record), Some(5 + 2 * 3));
    }

    #[test]
    fn test_missing_abstract_scores_title_only() {
        let scorer = scorer(vec![category("AI", 5, &["neural", "learning"])]);
        assert_eq!(scorer.score_record(&enriched("US-1-B2", "Neural chip", None)), Some(5));
        assert_eq!(scorer.score_record(&enriched("US-2-B2", "Bicycle", None)), Some(0));
    }

    #[test]
    fn test_undefined_scores_excluded_from_ranking() {
        let scorer = scorer(vec![category("Bad", -4, &["valve"]), category("Good", 2, &["pump"])]);
        let records = vec![
            enriched("A", "Pump", None),
            enriched("B", "Valve", None),
            enriched("C", "Pump and pump housing", None),
            enriched("D", "Nothing", None),
        ];

        let all = scorer.score_all(&records);
        let ids: Vec<&str> = all.iter().map(|r| r.record.id()).collect();
        assert_eq!(ids, vec!["A", "B", "C", "D"]);
        assert_eq!(all[1].relevance_score, None);

        let ranked = rank(&all);
        let ranked_ids: Vec<&str> = ranked.iter().map(|r| r.record.id()).collect();
        assert_eq!(ranked_ids, vec!["A", "C", "D"]);
    }

    #[test]
    fn test_blank_keywords_never_match() {
        let scorer = scorer(vec![
            category("Blank", 7, &["", "   "]),
            category("Pumps", 3, &["", "pump", "PUMP "]),
        ]);
        assert_eq!(scorer.score_record(&enriched("A", "Nothing relevant", None)), Some(0));
        assert_eq!(scorer.score_record(&enriched("B", "Pump housing", None)), Some(3));
    }

    #[test]
    fn test_overflow_is_undefined() {
        let scorer = scorer(vec![category("Huge", i64::MAX, &["a", "b"])]);
        assert_eq!(scorer.score_record(&enriched("X", "a b", None)), None);
    }

    #[test]
    fn test_score_sorts_descending() {
        let scorer = scorer(vec![category("AI", 5, &["neural", "learning", "model"])]);
        let records = vec![
            enriched("low", "Bicycle", None),
            enriched("high", "Neural model", Some("learning")),
            enriched("mid", "Neural", None),
        ];
        let ranked = scorer.score(&records);
        let scores: Vec<Option<u64>> = ranked.iter().map(|r| r.relevance_score).collect();
        assert_eq!(scores, vec![Some(15), Some(5), Some(0)]);
    }

    #[test]
    fn test_statistics() {
        let scorer = scorer(vec![category("AI", 10, &["neural", "learning", "model"])]);
        let records = vec![
            enriched("A", "Neural model learning", None),
            enriched("B", "Bicycle", None),
            enriched("C", "Neural", None),
        ];
        let stats = statistics(&scorer.score_all(&records)).expect("stats");
        assert_eq!(stats.total_patents, 3);
        assert_eq!(stats.max_score, 30);
        assert_eq!(stats.min_score, 0);
        assert_eq!(stats.zero_score_count, 1);
        assert_eq!(stats.high_score_count, 1);
        assert!((stats.average_score - 40.0 / 3.0).abs() < 1e-9);
        assert!(statistics(&[]).is_none());
    }

    #[test]
    fn test_keyword_file_and_sort_scored_file() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let keywords = temp.path().join("scoring_keywords.json");
        std::fs::write(
            &keywords,
            r#"{"keyword_categories": [{"name": "AI", "score": 5, "keywords": ["neural", "learning"]}]}"#,
        )?;
        let scorer = RelevanceScorer::from_file(&keywords)?;

        let scored = scorer.score_all(&[enriched("A", "Bicycle", None), enriched("B", "Neural", None)]);
        let input = temp.path().join("scored_patents_20250101_000000.json");
        crate::write_json(&input, &scored)?;

        let output = sort_scored_file(&input, None)?;
        assert_eq!(output, temp.path().join("scored_patents_20250101_000000_sorted.json"));
        let sorted: Vec<ScoredRecord> = serde_json::from_str(&std::fs::read_to_string(&output)?)?;
        assert_eq!(sorted[0].record.id(), "B");
        assert_eq!(sorted[0].relevance_score, Some(5));
        Ok(())
    }
}
