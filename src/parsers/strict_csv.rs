//! Journal CSV template import.
//!
//! Columns are matched by header name. Rows are validated with the same
//! rules as broker imports, but failures are reported per row instead of
//! being skipped quietly, and only rows with no errors are importable.

use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::calc::profit_loss_or_zero;
use crate::error::{JournalError, Result};
use crate::parsers::dates::parse_strict_date;
use crate::parsers::row::{
    optional_positive_number, parse_number, positive_number, required_direction, required_symbol,
    split_tags, NormalizedTrade, SkipReason,
};

pub const TEMPLATE_HEADERS: [&str; 11] = [
    "Date", "Pair", "Type", "Entry", "Exit", "SL", "TP", "Lot", "Notes", "Tags", "Session",
];
pub const REQUIRED_HEADERS: [&str; 5] = ["Date", "Pair", "Type", "Entry", "Lot"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrictRow {
    pub line: u64,
    pub trade: Option<NormalizedTrade>,
    pub errors: Vec<String>,
}

impl StrictRow {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty() && self.trade.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrictImportReport {
    pub rows: Vec<StrictRow>,
}

impl StrictImportReport {
    pub fn valid_trades(&self) -> Vec<NormalizedTrade> {
        self.rows.iter().filter_map(|r| if r.is_valid() { r.trade.clone() } else { None }).collect()
    }

    pub fn invalid_rows(&self) -> Vec<&StrictRow> {
        self.rows.iter().filter(|r| !r.is_valid()).collect()
    }
}

struct Columns(HashMap<String, usize>);

impl Columns {
    fn get<'r>(&self, record: &'r StringRecord, name: &str) -> Option<&'r str> {
        self.0
            .get(&name.to_lowercase())
            .and_then(|idx| record.get(*idx))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

fn collect<T>(errors: &mut Vec<String>, result: std::result::Result<T, SkipReason>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(reason) => {
            errors.push(reason.to_string());
            None
        }
    }
}

fn validate_row(columns: &Columns, record: &StringRecord) -> (Option<NormalizedTrade>, Vec<String>) {
    let mut errors = Vec::new();

    let date = match columns.get(record, "Date") {
        None => {
            errors.push(SkipReason::Missing("Date".into()).to_string());
            None
        }
        Some(raw) => {
            let parsed = parse_strict_date(raw);
            if parsed.is_none() {
                errors.push(SkipReason::InvalidDate(raw.to_string()).to_string());
            }
            parsed
        }
    };
    let symbol = collect(&mut errors, required_symbol("Pair", columns.get(record, "Pair")));
    let direction = collect(&mut errors, required_direction(columns.get(record, "Type")));
    let entry = collect(&mut errors, positive_number("Entry", columns.get(record, "Entry")));
    let lot = collect(&mut errors, positive_number("Lot", columns.get(record, "Lot")));
    let exit = collect(&mut errors, optional_positive_number("Exit", columns.get(record, "Exit")));
    let stop_loss = collect(&mut errors, parse_number("SL", columns.get(record, "SL")));
    let take_profit = collect(&mut errors, parse_number("TP", columns.get(record, "TP")));

    if !errors.is_empty() {
        return (None, errors);
    }

    let (Some(date), Some(symbol), Some(direction), Some(entry), Some(lot), Some(exit), Some(stop_loss), Some(take_profit)) =
        (date, symbol, direction, entry, lot, exit, stop_loss, take_profit)
    else {
        return (None, vec!["Row could not be validated".to_string()]);
    };

    let profit_loss = match profit_loss_or_zero(entry, exit, lot, direction, &symbol) {
        Ok(pl) => pl,
        Err(e) => return (None, vec![e.to_string()]),
    };

    let entry_date = date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp()).unwrap_or(0);
    let trade = NormalizedTrade {
        symbol,
        direction,
        entry_price: entry,
        exit_price: exit,
        lot_size: lot,
        stop_loss,
        take_profit,
        profit_loss,
        entry_date,
        exit_date: exit.map(|_| entry_date),
        duration_minutes: 0,
        commission: 0.0,
        notes: columns.get(record, "Notes").unwrap_or_default().to_string(),
        tags: split_tags(columns.get(record, "Tags")),
        session: columns.get(record, "Session").map(str::to_string),
    };

    (Some(trade), errors)
}

/// Validates a template CSV. A missing required header fails the whole file;
/// row problems are collected in the report.
pub fn parse_strict_csv(content: &str) -> Result<StrictImportReport> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(content.as_bytes());

    let headers = reader.headers()?.clone();
    let columns = Columns(
        headers
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.trim_start_matches('\u{feff}').trim().to_lowercase(), idx))
            .collect(),
    );

    let missing: Vec<String> = REQUIRED_HEADERS
        .iter()
        .filter(|h| !columns.0.contains_key(&h.to_lowercase()))
        .map(|h| h.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(JournalError::MissingColumns(missing));
    }

    let mut report = StrictImportReport::default();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let (trade, errors) = validate_row(&columns, &record);
        report.rows.push(StrictRow { line, trade, errors });
    }

    log::info!(
        "Validated {} template rows: {} valid, {} with errors",
        report.rows.len(),
        report.valid_trades().len(),
        report.invalid_rows().len()
    );

    Ok(report)
}
