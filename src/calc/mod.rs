pub mod instrument;
pub mod pnl;

pub use instrument::{classify_instrument, contract_size, normalize_symbol, pip_size, InstrumentClass};
pub use pnl::{calculate_profit_loss, pips, profit_loss_or_zero, round2};
