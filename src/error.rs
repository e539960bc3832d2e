//! Custom error types for patentinsight.
//!
//! Stage-level failures (file I/O, malformed JSON/CSV, bad configuration)
//! surface as `PatentError`. Per-record fetch failures never do: they are
//! recorded into the abstract store instead (see [`crate::scrape::ScrapeError`]).

use thiserror::Error;

/// Main error type for patentinsight operations.
#[derive(Debug, Error)]
pub enum PatentError {
    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// HTML or tool output parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV reading error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// A pipeline stage could not run or did not complete
    #[error("Stage '{stage}' failed: {message}")]
    Stage {
        /// Stage name as recorded in the run report
        stage: String,
        /// Underlying failure
        message: String,
    },
}

/// Result type alias using `PatentError`
pub type Result<T> = std::result::Result<T, PatentError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| PatentError::Parse(msg.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_or_parse() {
        let missing: Option<u32> = None;
        let err = missing.ok_or_parse("no header row").unwrap_err();
        assert_eq!(err.to_string(), "Parse error: no header row");
        assert_eq!(Some(3).ok_or_parse("unused").unwrap(), 3);
    }

    #[test]
    fn test_stage_display() {
        let err = PatentError::Stage {
            stage: "csv_to_json".to_string(),
            message: "input missing".to_string(),
        };
        assert_eq!(err.to_string(), "Stage 'csv_to_json' failed: input missing");
    }
}
