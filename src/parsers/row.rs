//! Row validation shared by the lenient and strict importers.
//!
//! Every row becomes either a [`NormalizedTrade`] or a [`SkipReason`]. The
//! lenient importer counts skips; the strict importer reports the same
//! reasons as row errors.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::calc::{normalize_symbol, profit_loss_or_zero};
use crate::models::Direction;
use crate::parsers::dates::parse_datetime;

pub const IMPORTED_TAG: &str = "imported";

/// Trade record as produced by any importer, before it is bound to a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTrade {
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub lot_size: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub profit_loss: f64,
    pub entry_date: i64,
    pub exit_date: Option<i64>,
    pub duration_minutes: i64,
    pub commission: f64,
    pub notes: String,
    pub tags: Vec<String>,
    pub session: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SkipReason {
    EmptyRow,
    UnsupportedLayout(usize),
    Missing(String),
    InvalidNumber { field: String, value: String },
    NotPositive(String),
    UnknownType(String),
    InvalidDate(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::EmptyRow => write!(f, "Empty row"),
            SkipReason::UnsupportedLayout(n) => write!(f, "Unsupported row layout ({} columns)", n),
            SkipReason::Missing(field) => write!(f, "{} is required", field),
            SkipReason::InvalidNumber { field, value } => {
                write!(f, "{} must be a number (got '{}')", field, value)
            }
            SkipReason::NotPositive(field) => write!(f, "{} must be greater than 0", field),
            SkipReason::UnknownType(value) => write!(f, "Type must be Buy or Sell (got '{}')", value),
            SkipReason::InvalidDate(value) => {
                write!(f, "Date must be in YYYY-MM-DD format (got '{}')", value)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Parsed(NormalizedTrade),
    Skipped(SkipReason),
}

impl RowOutcome {
    pub fn is_parsed(&self) -> bool {
        matches!(self, RowOutcome::Parsed(_))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Blank cells are absent. Non-blank cells must hold a finite number;
/// spaces and thousands separators are tolerated, a lone comma is read as
/// the decimal mark.
pub fn parse_number(field: &str, value: Option<&str>) -> Result<Option<f64>, SkipReason> {
    let Some(raw) = non_blank(value) else {
        return Ok(None);
    };

    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let candidate = if compact.contains(',') && !compact.contains('.') {
        compact.replace(',', ".")
    } else {
        compact.replace(',', "")
    };

    match candidate.parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(Some(n)),
        _ => Err(SkipReason::InvalidNumber {
            field: field.to_string(),
            value: raw.to_string(),
        }),
    }
}

pub fn required_number(field: &str, value: Option<&str>) -> Result<f64, SkipReason> {
    parse_number(field, value)?.ok_or_else(|| SkipReason::Missing(field.to_string()))
}

pub fn positive_number(field: &str, value: Option<&str>) -> Result<f64, SkipReason> {
    let n = required_number(field, value)?;
    if n > 0.0 {
        Ok(n)
    } else {
        Err(SkipReason::NotPositive(field.to_string()))
    }
}

/// Blank is fine; a present value must be greater than zero.
pub fn optional_positive_number(
    field: &str,
    value: Option<&str>,
) -> Result<Option<f64>, SkipReason> {
    match parse_number(field, value)? {
        Some(n) if n <= 0.0 => Err(SkipReason::NotPositive(field.to_string())),
        other => Ok(other),
    }
}

pub fn required_symbol(field: &str, value: Option<&str>) -> Result<String, SkipReason> {
    non_blank(value)
        .map(normalize_symbol)
        .ok_or_else(|| SkipReason::Missing(field.to_string()))
}

pub fn required_direction(value: Option<&str>) -> Result<Direction, SkipReason> {
    let raw = non_blank(value).ok_or_else(|| SkipReason::Missing("Type".to_string()))?;
    Direction::parse_lenient(raw).ok_or_else(|| SkipReason::UnknownType(raw.to_string()))
}

/// Splits a tag cell on commas, semicolons and whitespace.
pub fn split_tags(value: Option<&str>) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for part in value.unwrap_or("").split(|c: char| c == ',' || c == ';' || c.is_whitespace()) {
        let tag = crate::commands::tags::normalize_tag(part);
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

/// A broker order-history record with every cell still as text. Fields the
/// export shape does not carry stay `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawOrder {
    pub ticket: Option<String>,
    pub open_time: Option<String>,
    pub kind: Option<String>,
    pub size: Option<String>,
    pub symbol: Option<String>,
    pub open_price: Option<String>,
    pub stop_loss: Option<String>,
    pub take_profit: Option<String>,
    pub close_time: Option<String>,
    pub close_price: Option<String>,
    pub commission: Option<String>,
    pub swap: Option<String>,
    pub profit: Option<String>,
}

fn timestamp_or_now(value: Option<&str>, field: &str) -> i64 {
    match non_blank(value) {
        Some(raw) => match parse_datetime(raw) {
            Some(dt) => dt.and_utc().timestamp(),
            None => {
                log::warn!("Unparseable {} '{}', using current time", field, raw);
                Utc::now().timestamp()
            }
        },
        None => Utc::now().timestamp(),
    }
}

/// Lenient normalization of one broker record.
///
/// Unparseable dates fall back to the current time; everything else that
/// does not validate skips the row.
pub fn normalize_order(raw: &RawOrder, source: &str) -> RowOutcome {
    match try_normalize_order(raw, source) {
        Ok(trade) => RowOutcome::Parsed(trade),
        Err(reason) => RowOutcome::Skipped(reason),
    }
}

fn try_normalize_order(raw: &RawOrder, source: &str) -> Result<NormalizedTrade, SkipReason> {
    let symbol = required_symbol("Symbol", raw.symbol.as_deref())?;
    let entry_price = positive_number("Entry price", raw.open_price.as_deref())?;
    let direction = required_direction(raw.kind.as_deref())?;
    let lot_size = positive_number("Lot size", raw.size.as_deref())?;

    let exit_price = parse_number("Exit price", raw.close_price.as_deref())?.filter(|p| *p > 0.0);
    // MetaTrader writes 0 for an unset stop or target.
    let stop_loss = parse_number("Stop loss", raw.stop_loss.as_deref())?.filter(|p| *p > 0.0);
    let take_profit = parse_number("Take profit", raw.take_profit.as_deref())?.filter(|p| *p > 0.0);
    let commission = parse_number("Commission", raw.commission.as_deref())?.unwrap_or(0.0);
    let swap = parse_number("Swap", raw.swap.as_deref())?.unwrap_or(0.0);

    let entry_date = timestamp_or_now(raw.open_time.as_deref(), "open time");
    let exit_date = match (exit_price, non_blank(raw.close_time.as_deref())) {
        (Some(_), Some(_)) => Some(timestamp_or_now(raw.close_time.as_deref(), "close time")),
        (Some(_), None) => Some(entry_date),
        (None, _) => None,
    };
    let duration_minutes = exit_date
        .map(|closed| ((closed - entry_date) / 60).max(0))
        .unwrap_or(0);

    let profit_loss = profit_loss_or_zero(entry_price, exit_price, lot_size, direction, &symbol)
        .map_err(|_| SkipReason::InvalidNumber {
            field: "Entry price".to_string(),
            value: entry_price.to_string(),
        })?;

    let notes = match non_blank(raw.ticket.as_deref()) {
        Some(ticket) => format!("Imported from {} (ticket {})", source, ticket),
        None => format!("Imported from {}", source),
    };

    Ok(NormalizedTrade {
        symbol,
        direction,
        entry_price,
        exit_price,
        lot_size,
        stop_loss,
        take_profit,
        profit_loss,
        entry_date,
        exit_date,
        duration_minutes,
        commission: commission.abs() + swap.abs(),
        notes,
        tags: vec![IMPORTED_TAG.to_string()],
        session: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> RawOrder {
        RawOrder {
            ticket: Some("1001".into()),
            open_time: Some("2024.03.01 09:00:00".into()),
            kind: Some("buy".into()),
            size: Some("1.00".into()),
            symbol: Some("EURUSD".into()),
            open_price: Some("1.1000".into()),
            stop_loss: Some("0.0000".into()),
            take_profit: Some("1.1100".into()),
            close_time: Some("2024.03.01 11:30:00".into()),
            close_price: Some("1.1050".into()),
            commission: Some("-7.00".into()),
            swap: Some("-1.50".into()),
            profit: Some("500.00".into()),
        }
    }

    #[test]
    fn test_normalize_full_order() {
        let RowOutcome::Parsed(trade) = normalize_order(&order(), "MetaTrader") else {
            panic!("expected parsed row");
        };
        assert_eq!(trade.symbol, "EUR/USD");
        assert_eq!(trade.direction, Direction::Buy);
        assert_eq!(trade.profit_loss, 500.0);
        assert_eq!(trade.commission, 8.5);
        assert_eq!(trade.duration_minutes, 150);
        assert_eq!(trade.stop_loss, None);
        assert_eq!(trade.take_profit, Some(1.11));
        assert_eq!(trade.tags, vec!["imported".to_string()]);
        assert!(trade.notes.contains("ticket 1001"));
    }

    #[test]
    fn test_missing_symbol_entry_or_type_is_skipped() {
        let mut raw = order();
        raw.symbol = Some("  ".into());
        assert_eq!(
            normalize_order(&raw, "x"),
            RowOutcome::Skipped(SkipReason::Missing("Symbol".into()))
        );

        let mut raw = order();
        raw.open_price = Some("abc".into());
        assert!(matches!(
            normalize_order(&raw, "x"),
            RowOutcome::Skipped(SkipReason::InvalidNumber { .. })
        ));

        let mut raw = order();
        raw.kind = Some("balance".into());
        assert_eq!(
            normalize_order(&raw, "x"),
            RowOutcome::Skipped(SkipReason::UnknownType("balance".into()))
        );
    }

    #[test]
    fn test_garbage_optional_number_skips_instead_of_zero() {
        let mut raw = order();
        raw.commission = Some("n/a".into());
        assert!(matches!(
            normalize_order(&raw, "x"),
            RowOutcome::Skipped(SkipReason::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_unparseable_date_falls_back_to_now() {
        let mut raw = order();
        raw.open_time = Some("someday".into());
        raw.close_time = None;
        let before = Utc::now().timestamp();
        let RowOutcome::Parsed(trade) = normalize_order(&raw, "x") else {
            panic!("expected parsed row");
        };
        assert!(trade.entry_date >= before);
        assert_eq!(trade.exit_date, Some(trade.entry_date));
    }

    #[test]
    fn test_parse_number_variants() {
        assert_eq!(parse_number("n", Some("1 234.50")).unwrap(), Some(1234.5));
        assert_eq!(parse_number("n", Some("1,234.50")).unwrap(), Some(1234.5));
        assert_eq!(parse_number("n", Some("0,5")).unwrap(), Some(0.5));
        assert_eq!(parse_number("n", Some("")).unwrap(), None);
        assert!(parse_number("n", Some("NaN")).is_err());
        assert!(parse_number("n", Some("inf")).is_err());
    }

    #[test]
    fn test_split_tags() {
        let tags = split_tags(Some("#Breakout, london;Breakout  news"));
        assert_eq!(tags, vec!["breakout", "london", "news"]);
    }
}
