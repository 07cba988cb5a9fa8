use crate::calc::instrument::{contract_size, pip_size, InstrumentClass};
use crate::error::{JournalError, Result};
use crate::models::Direction;

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn finite(field: &str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(JournalError::invalid_number(field, value))
    }
}

/// Signed price move in the trade's favour.
pub fn price_difference(entry: f64, exit: f64, direction: Direction) -> f64 {
    match direction {
        Direction::Buy => exit - entry,
        Direction::Sell => entry - exit,
    }
}

/// Profit or loss in account currency, rounded to cents.
///
/// `instrument` is the traded symbol; it picks the instrument class and with
/// it the contract size. Non-finite inputs are rejected.
pub fn calculate_profit_loss(
    entry: f64,
    exit: f64,
    lot_size: f64,
    direction: Direction,
    instrument: &str,
) -> Result<f64> {
    let entry = finite("entry", entry)?;
    let exit = finite("exit", exit)?;
    let lot_size = finite("lot size", lot_size)?;

    let class = InstrumentClass::classify(instrument);
    let multiplier = contract_size(class, instrument);
    let diff = price_difference(entry, exit, direction);

    Ok(round2(diff * lot_size * multiplier))
}

/// P/L of a possibly open trade. Open trades carry zero until closed.
pub fn profit_loss_or_zero(
    entry: f64,
    exit: Option<f64>,
    lot_size: f64,
    direction: Direction,
    instrument: &str,
) -> Result<f64> {
    match exit {
        Some(exit) => calculate_profit_loss(entry, exit, lot_size, direction, instrument),
        None => Ok(0.0),
    }
}

/// Move in pips for forex pairs; `None` for other instrument classes.
pub fn pips(entry: f64, exit: f64, direction: Direction, instrument: &str) -> Option<f64> {
    if InstrumentClass::classify(instrument) != InstrumentClass::Forex {
        return None;
    }
    let diff = price_difference(entry, exit, direction);
    Some((diff / pip_size(instrument) * 10.0).round() / 10.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_stock_uses_lot_size_as_shares() {
        let pl = calculate_profit_loss(100.0, 110.0, 1.0, Direction::Buy, "AAPL").unwrap();
        assert_relative_eq!(pl, 10.00);
        let pl = calculate_profit_loss(100.0, 110.0, 25.0, Direction::Buy, "AAPL").unwrap();
        assert_relative_eq!(pl, 250.00);
    }

    #[test]
    fn test_forex_standard_lot() {
        let pl = calculate_profit_loss(1.1000, 1.1050, 1.0, Direction::Buy, "EUR/USD").unwrap();
        assert_relative_eq!(pl, 500.00);
    }

    #[test]
    fn test_buy_and_sell_are_mirrored() {
        let cases = [
            (1.1000, 1.1050, 1.0),
            (1.2712, 1.2650, 0.3),
            (149.20, 150.05, 2.0),
            (0.6650, 0.6650, 1.0),
        ];
        for (entry, exit, lots) in cases {
            let buy = calculate_profit_loss(entry, exit, lots, Direction::Buy, "forex/pair").unwrap();
            let sell = calculate_profit_loss(entry, exit, lots, Direction::Sell, "forex/pair").unwrap();
            assert_relative_eq!(buy, -sell);
        }
    }

    #[test]
    fn test_sign_matches_direction() {
        let short_win = calculate_profit_loss(2000.0, 1950.0, 1.0, Direction::Sell, "XAUUSD").unwrap();
        assert_relative_eq!(short_win, 5000.00);
        let long_loss = calculate_profit_loss(65000.0, 64000.0, 0.5, Direction::Buy, "BTCUSDT").unwrap();
        assert_relative_eq!(long_loss, -500.00);
    }

    #[test]
    fn test_commodity_contract_sizes() {
        let silver = calculate_profit_loss(24.00, 24.50, 1.0, Direction::Buy, "XAGUSD").unwrap();
        assert_relative_eq!(silver, 25.00);
        let oil = calculate_profit_loss(80.00, 81.00, 0.1, Direction::Buy, "USOIL").unwrap();
        assert_relative_eq!(oil, 100.00);
    }

    #[test]
    fn test_non_finite_input_rejected() {
        let err = calculate_profit_loss(f64::NAN, 1.0, 1.0, Direction::Buy, "AAPL").unwrap_err();
        assert!(matches!(err, JournalError::InvalidNumber { .. }));
        assert!(calculate_profit_loss(1.0, f64::INFINITY, 1.0, Direction::Buy, "AAPL").is_err());
    }

    #[test]
    fn test_open_trade_is_zero() {
        let pl = profit_loss_or_zero(1.0, None, 1.0, Direction::Buy, "EUR/USD").unwrap();
        assert_eq!(pl, 0.0);
    }

    #[test]
    fn test_pips() {
        assert_eq!(pips(1.1000, 1.1050, Direction::Buy, "EUR/USD"), Some(50.0));
        assert_eq!(pips(150.00, 149.50, Direction::Sell, "USD/JPY"), Some(50.0));
        assert_eq!(pips(100.0, 110.0, Direction::Buy, "AAPL"), None);
    }
}
