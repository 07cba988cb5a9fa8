//! MetaTrader order-history rows.
//!
//! Exports come with or without a header line and in three widths:
//!
//! | columns | layout |
//! |---|---|
//! | 7  | ticket, open time, type, size, symbol, open price, close price |
//! | 10 | ticket, open time, type, size, symbol, open price, S/L, T/P, close time, close price |
//! | 13 | the 10-column layout, then commission, swap, profit |
//!
//! A header line fails validation like any other bad row and is skipped.

use csv::{ReaderBuilder, Trim};

use crate::error::Result;
use crate::parsers::row::{normalize_order, RawOrder, RowOutcome, SkipReason};

pub const SOURCE: &str = "MetaTrader";

fn cell(fields: &[String], idx: usize) -> Option<String> {
    fields.get(idx).map(|f| f.trim_start_matches('\u{feff}').trim().to_string())
}

/// Positional destructuring by row width.
pub fn raw_order_from_fields(fields: &[String]) -> std::result::Result<RawOrder, SkipReason> {
    if fields.iter().all(|f| f.trim().is_empty()) {
        return Err(SkipReason::EmptyRow);
    }

    let mut raw = RawOrder {
        ticket: cell(fields, 0),
        open_time: cell(fields, 1),
        kind: cell(fields, 2),
        size: cell(fields, 3),
        symbol: cell(fields, 4),
        open_price: cell(fields, 5),
        ..RawOrder::default()
    };

    match fields.len() {
        7 => {
            raw.close_price = cell(fields, 6);
        }
        10 | 13 => {
            raw.stop_loss = cell(fields, 6);
            raw.take_profit = cell(fields, 7);
            raw.close_time = cell(fields, 8);
            raw.close_price = cell(fields, 9);
            if fields.len() == 13 {
                raw.commission = cell(fields, 10);
                raw.swap = cell(fields, 11);
                raw.profit = cell(fields, 12);
            }
        }
        n => return Err(SkipReason::UnsupportedLayout(n)),
    }

    Ok(raw)
}

pub fn normalize_fields(fields: &[String]) -> RowOutcome {
    match raw_order_from_fields(fields) {
        Ok(raw) => normalize_order(&raw, SOURCE),
        Err(reason) => RowOutcome::Skipped(reason),
    }
}

/// One outcome per CSV record.
pub fn parse_csv(content: &str) -> Result<Vec<RowOutcome>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(content.as_bytes());

    let mut outcomes = Vec::new();
    for record in reader.records() {
        let record = record?;
        let fields: Vec<String> = record.iter().map(str::to_string).collect();
        outcomes.push(normalize_fields(&fields));
    }

    log::debug!(
        "Parsed {} CSV rows ({} usable)",
        outcomes.len(),
        outcomes.iter().filter(|o| o.is_parsed()).count()
    );

    Ok(outcomes)
}
