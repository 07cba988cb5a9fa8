use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::JournalError;

/// Trade direction. Shown as Buy/Sell, persisted as long/short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[serde(rename = "long", alias = "buy", alias = "Buy")]
    Buy,
    #[serde(rename = "short", alias = "sell", alias = "Sell")]
    Sell,
}

impl Direction {
    /// Accepts buy/sell/long/short in any case. Anything else (pending
    /// order types, balance rows) is not a direction.
    pub fn parse_lenient(value: &str) -> Option<Direction> {
        match value.trim().to_lowercase().as_str() {
            "buy" | "long" | "b" => Some(Direction::Buy),
            "sell" | "short" | "s" => Some(Direction::Sell),
            _ => None,
        }
    }

    pub fn as_db_str(&self) -> &'static str {
        match self {
            Direction::Buy => "long",
            Direction::Sell => "short",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => write!(f, "Buy"),
            Direction::Sell => write!(f, "Sell"),
        }
    }
}

impl FromStr for Direction {
    type Err = JournalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Direction::parse_lenient(s)
            .ok_or_else(|| JournalError::InvalidInput(format!("Type must be Buy or Sell, got '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportSource {
    UserCreated,
    FileImport,
    CsvImport,
}

impl ImportSource {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            ImportSource::UserCreated => "USER_CREATED",
            ImportSource::FileImport => "FILE_IMPORT",
            ImportSource::CsvImport => "CSV_IMPORT",
        }
    }

    pub fn from_db_str(value: &str) -> ImportSource {
        match value {
            "FILE_IMPORT" => ImportSource::FileImport,
            "CSV_IMPORT" => ImportSource::CsvImport,
            _ => ImportSource::UserCreated,
        }
    }
}

impl Default for ImportSource {
    fn default() -> Self {
        ImportSource::UserCreated
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub user_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub quantity: f64,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub take_profit: Option<f64>,
    pub entry_date: i64,
    pub exit_date: Option<i64>,
    #[serde(default)]
    pub duration_minutes: i64,
    pub profit_loss: f64,
    pub fees: f64,
    pub notes: String,
    pub tags: Vec<String>,
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub import_fingerprint: Option<String>,
    #[serde(default)]
    pub import_source: ImportSource,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Trade {
    pub fn is_open(&self) -> bool {
        self.exit_price.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTradeInput {
    pub symbol: String,
    pub direction: Option<Direction>,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub quantity: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub entry_date: i64,
    pub exit_date: Option<i64>,
    pub fees: f64,
    pub notes: String,
    pub tags: Vec<String>,
    pub session: Option<String>,
}

/// Partial edit. Fields left as `None` keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeUpdate {
    pub symbol: Option<String>,
    pub direction: Option<Direction>,
    pub entry_price: Option<f64>,
    pub exit_price: Option<f64>,
    pub quantity: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub entry_date: Option<i64>,
    pub exit_date: Option<i64>,
    pub fees: Option<f64>,
    pub notes: Option<String>,
    pub tags: Option<Vec<String>>,
    pub session: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeFilters {
    pub symbol: Option<String>,
    pub direction: Option<Direction>,
    pub tag: Option<String>,
    pub start_date: Option<i64>,
    pub end_date: Option<i64>,
    pub page: Option<i32>,
    pub limit: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_serializes_as_long_short() {
        assert_eq!(serde_json::to_string(&Direction::Buy).unwrap(), "\"long\"");
        assert_eq!(serde_json::to_string(&Direction::Sell).unwrap(), "\"short\"");
        let parsed: Direction = serde_json::from_str("\"Sell\"").unwrap();
        assert_eq!(parsed, Direction::Sell);
    }

    #[test]
    fn test_direction_lenient_parse() {
        assert_eq!(Direction::parse_lenient(" BUY "), Some(Direction::Buy));
        assert_eq!(Direction::parse_lenient("short"), Some(Direction::Sell));
        assert_eq!(Direction::parse_lenient("buy limit"), None);
        assert_eq!(Direction::parse_lenient("balance"), None);
        assert!("hold".parse::<Direction>().is_err());
    }

    #[test]
    fn test_trade_without_import_source_defaults_to_user_created() {
        let json = r#"{
            "id": "TRADE-1",
            "user_id": "u1",
            "symbol": "EUR/USD",
            "direction": "long",
            "entry_price": 1.1,
            "exit_price": 1.105,
            "quantity": 1.0,
            "entry_date": 1704067200,
            "exit_date": null,
            "profit_loss": 500.0,
            "fees": 0.0,
            "notes": "",
            "tags": ["breakout"],
            "created_at": 1704067200,
            "updated_at": 1704067200
        }"#;

        let trade: Trade = serde_json::from_str(json).unwrap();
        assert_eq!(trade.import_source, ImportSource::UserCreated);
        assert_eq!(trade.duration_minutes, 0);
        assert!(trade.stop_loss.is_none());
        assert!(!trade.is_open());
    }
}
