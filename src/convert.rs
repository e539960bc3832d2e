//! CSV to JSON conversion of Google Patents search exports.
//!
//! Exports downloaded from Google Patents start with a `search URL:` line
//! before the real header; that line is skipped when present.

use crate::error::{OptionExt, PatentError, Result};
use crate::patent::PatentRecord;
use std::path::Path;
use tracing::{debug, info};

/// Converts raw export text into typed patent records.
pub trait RecordConverter {
    /// Parse the full text of an export.
    fn convert(&self, text: &str) -> Result<Vec<PatentRecord>>;
}

/// Column names used by the Google Patents CSV export
mod columns {
    pub const ID: &str = "id";
    pub const TITLE: &str = "title";
    pub const ASSIGNEE: &str = "assignee";
    pub const INVENTORS: &str = "inventor/author";
    pub const PRIORITY_DATE: &str = "priority date";
    pub const FILING_DATE: &str = "filing/creation date";
    pub const PUBLICATION_DATE: &str = "publication date";
    pub const GRANT_DATE: &str = "grant date";
    pub const RESULT_LINK: &str = "result link";
}

/// `csv`-crate backed converter for Google Patents exports
#[derive(Debug, Clone, Default)]
pub struct CsvConverter;

impl RecordConverter for CsvConverter {
    fn convert(&self, text: &str) -> Result<Vec<PatentRecord>> {
        let body = skip_preamble(text)?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(body.as_bytes());

        let headers = reader.headers()?.clone();
        let position = |name: &str| headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name));

        let id_col = position(columns::ID).ok_or_parse("CSV header has no 'id' column")?;
        let cols = [
            position(columns::TITLE),
            position(columns::ASSIGNEE),
            position(columns::INVENTORS),
            position(columns::PRIORITY_DATE),
            position(columns::FILING_DATE),
            position(columns::PUBLICATION_DATE),
            position(columns::GRANT_DATE),
            position(columns::RESULT_LINK),
        ];

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            let field = |idx: Option<usize>| idx.and_then(|i| row.get(i)).unwrap_or("").to_string();

            let id = field(Some(id_col));
            // Blank lines and repeated header rows
            if id.is_empty() || id.eq_ignore_ascii_case(columns::ID) {
                continue;
            }

            records.push(PatentRecord {
                id,
                title: field(cols[0]),
                assignee: field(cols[1]),
                inventors: field(cols[2]),
                priority_date: field(cols[3]),
                filing_date: field(cols[4]),
                publication_date: field(cols[5]),
                grant_date: field(cols[6]),
                result_link: field(cols[7]),
            });
        }

        debug!(count = records.len(), "Parsed CSV rows");
        Ok(records)
    }
}

/// Return the text starting at the header line.
fn skip_preamble(text: &str) -> Result<&str> {
    let text = text.trim_start_matches('\u{feff}');
    let first_line = text.lines().next().ok_or_parse("CSV input is empty")?;

    if first_line.to_ascii_lowercase().starts_with("id,") {
        return Ok(text);
    }

    match text.find('\n') {
        Some(idx) => Ok(&text[idx + 1..]),
        None => Err(PatentError::Parse("CSV input has no header row".to_string())),
    }
}

/// Convert a CSV export file and write the records as a JSON array.
pub fn convert_file<C: RecordConverter>(converter: &C, csv_path: &Path, json_path: &Path) -> Result<Vec<PatentRecord>> {
    info!(input = ?csv_path, "Converting CSV to JSON");

    let text = std::fs::read_to_string(csv_path)?;
    let records = converter.convert(&text)?;
    crate::write_json(json_path, &records)?;

    info!(output = ?json_path, count = records.len(), "CSV to JSON conversion completed");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "id,title,assignee,inventor/author,priority date,filing/creation date,publication date,grant date,result link,representative figure link";

    #[test]
    fn test_convert_with_search_url_preamble() {
        let text = format!(
            "search URL:,https://patents.google.com/?q=robot\n{}\nUS-9254383-B2,Robot arm,Acme Corp,Jane Doe,2012-01-01,2013-01-01,2016-02-09,2016-02-09,https://patents.google.com/patent/US9254383B2/en,\n",
            HEADER
        );

        let records = CsvConverter.convert(&text).expect("convert");
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.id, "US-9254383-B2");
        assert_eq!(r.title, "Robot arm");
        assert_eq!(r.inventors, "Jane Doe");
        assert_eq!(r.filing_date, "2013-01-01");
        assert_eq!(r.result_link, "https://patents.google.com/patent/US9254383B2/en");
    }

    #[test]
    fn test_convert_without_preamble_and_quoted_commas() {
        let text = format!(
            "{}\n\"JP-2020-1-A\",\"Sensor, optical\",\"Foo, Inc.\",\"A, B\",2019-05-01,2019-06-01,2020-01-01,,https://patents.google.com/patent/JP20201A/ja,\n",
            HEADER
        );

        let records = CsvConverter.convert(&text).expect("convert");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Sensor, optical");
        assert_eq!(records[0].assignee, "Foo, Inc.");
        assert!(records[0].grant_date.is_empty());
    }

    #[test]
    fn test_convert_skips_blank_ids_and_repeated_header() {
        let text = format!(
            "{h}\n,no id,,,,,,,,\n{h}\nUS-1-B2,t,,,,,,,https://patents.google.com/patent/US1B2/en,\n",
            h = HEADER
        );
        let records = CsvConverter.convert(&text).expect("convert");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "US-1-B2");
    }

    #[test]
    fn test_convert_empty_input_fails() {
        assert!(CsvConverter.convert("").is_err());
    }

    #[test]
    fn test_convert_file_writes_json() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let csv_path = dir.path().join("results.csv");
        let json_path = dir.path().join("converted.json");
        std::fs::write(
            &csv_path,
            format!("{}\nUS-1-B2,Titel über,,,,,,,https://patents.google.com/patent/US1B2/en,\n", HEADER),
        )?;

        let records = convert_file(&CsvConverter, &csv_path, &json_path)?;
        assert_eq!(records.len(), 1);

        let written = std::fs::read_to_string(&json_path)?;
        assert!(written.contains("Titel über"));
        let reread: Vec<PatentRecord> = serde_json::from_str(&written)?;
        assert_eq!(reread, records);
        Ok(())
    }
}
