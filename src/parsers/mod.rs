pub mod dates;
pub mod html;
pub mod metatrader;
pub mod row;
pub mod strict_csv;
pub mod xml;

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{JournalError, Result};

pub use row::{NormalizedTrade, RowOutcome, SkipReason};
pub use strict_csv::{parse_strict_csv, StrictImportReport, StrictRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportFormat {
    Csv,
    Xml,
    Html,
}

impl ImportFormat {
    pub fn from_extension(ext: &str) -> Result<Self> {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "csv" => Ok(ImportFormat::Csv),
            "xml" => Ok(ImportFormat::Xml),
            "html" | "htm" => Ok(ImportFormat::Html),
            other => Err(JournalError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| JournalError::UnsupportedFormat(path.display().to_string()))?;
        Self::from_extension(ext)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRow {
    pub row: usize,
    pub reason: SkipReason,
}

/// Result of reading one import file: the usable trades and why the other
/// rows were left out.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedImport {
    pub trades: Vec<NormalizedTrade>,
    pub skipped: Vec<SkippedRow>,
}

impl ParsedImport {
    pub fn from_outcomes(outcomes: Vec<RowOutcome>) -> Self {
        let mut parsed = ParsedImport::default();
        for (idx, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                RowOutcome::Parsed(trade) => parsed.trades.push(trade),
                // Blank lines are not worth reporting.
                RowOutcome::Skipped(SkipReason::EmptyRow) => {}
                RowOutcome::Skipped(reason) => parsed.skipped.push(SkippedRow { row: idx + 1, reason }),
            }
        }
        parsed
    }
}

pub fn parse_import(format: ImportFormat, content: &str) -> Result<ParsedImport> {
    let outcomes = match format {
        ImportFormat::Csv => metatrader::parse_csv(content)?,
        ImportFormat::Xml => xml::parse_xml(content)?,
        ImportFormat::Html => html::parse_html(content)?,
    };
    Ok(ParsedImport::from_outcomes(outcomes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection() {
        assert_eq!(ImportFormat::from_path(Path::new("a/history.CSV")).unwrap(), ImportFormat::Csv);
        assert_eq!(ImportFormat::from_path(Path::new("statement.htm")).unwrap(), ImportFormat::Html);
        assert_eq!(ImportFormat::from_extension(".xml").unwrap(), ImportFormat::Xml);
        assert!(matches!(
            ImportFormat::from_path(Path::new("report.xlsx")),
            Err(JournalError::UnsupportedFormat(_))
        ));
        assert!(ImportFormat::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn test_parsed_import_tracks_skips() {
        let csv = "Ticket,Time,Type,Size,Symbol,Price,Close\n\n1,2024.01.10 10:00,buy,1,AAPL,100,101\n";
        let parsed = parse_import(ImportFormat::Csv, csv).unwrap();
        assert_eq!(parsed.trades.len(), 1);
        assert_eq!(parsed.skipped.len(), 1);
        assert_eq!(parsed.skipped[0].row, 1);
    }
}
