pub mod connection;
pub mod migration_runner;
pub mod trade_repository;

pub use connection::Database;
pub use trade_repository::{MemoryTradeRepository, TradeRepository};
