//! Trading journal: trade log, profit/loss calculation and import of broker
//! order history (MetaTrader CSV, XML and HTML exports, plus the journal's
//! own CSV template).

pub mod calc;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod parsers;
pub mod session;

pub use config::AppConfig;
pub use db::{Database, MemoryTradeRepository, TradeRepository};
pub use error::{JournalError, Result};
pub use session::SessionStore;
