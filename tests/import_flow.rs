use std::fs;

use trade_journal::commands::{
    self, dashboard_stats, import_file, preview_import, register_user, DateRange,
};
use trade_journal::models::{Direction, RegisterUserInput, TradeFilters};
use trade_journal::parsers::ImportFormat;
use trade_journal::{Database, JournalError, SessionStore, TradeRepository};

const HISTORY_HTML: &str = r#"<html><body>
<table>
  <tr><th>Ticket</th><th>Open Time</th><th>Type</th><th>Size</th><th>Item</th><th>Price</th><th>S / L</th><th>T / P</th><th>Close Time</th><th>Price</th></tr>
  <tr><td>501</td><td>2024.05.06 08:00</td><td>buy</td><td>2.00</td><td>gbpusd</td><td>1.2500</td><td>0.0000</td><td>0.0000</td><td>2024.05.06 09:15</td><td>1.2530</td></tr>
  <tr><td>502</td><td>2024.05.07 14:00</td><td>sell</td><td>1.00</td><td>USDJPY</td><td>154.00</td><td>155.00</td><td>0.0000</td><td>2024.05.07 16:00</td><td>154.50</td></tr>
  <tr><td>503</td><td>2024.05.08 10:00</td><td>buy limit</td><td>1.00</td><td>EURUSD</td><td>1.0700</td><td>0</td><td>0</td><td></td><td>0</td></tr>
</table>
</body></html>"#;

const HISTORY_XML: &str = r#"<?xml version="1.0"?>
<history>
  <order ticket="601" open_time="2024.05.09 09:00" type="buy" lots="1" item="XAUUSD" price="2300.00" close_time="2024.05.09 11:00" close_price="2310.00" commission="-5" swap="-1"/>
</history>"#;

#[test]
fn test_import_dedup_and_stats_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("journal.db");
    let db = Database::new(db_path.to_str().unwrap()).unwrap();

    let user = register_user(
        &db,
        None,
        RegisterUserInput {
            email: "trader@example.com".into(),
            display_name: "Trader".into(),
            password: "hunter2hunter2".into(),
        },
    )
    .unwrap();
    let actor = user.actor();

    let html_path = dir.path().join("Statement.HTM");
    fs::write(&html_path, HISTORY_HTML).unwrap();
    let xml_path = dir.path().join("history.xml");
    fs::write(&xml_path, HISTORY_XML).unwrap();

    let preview = preview_import(&db, &user.id, ImportFormat::Html, HISTORY_HTML).unwrap();
    assert_eq!(preview.trades.len(), 2);
    assert!(preview.trades.iter().all(|t| !t.is_duplicate));

    let first = import_file(&db, &actor, &html_path, 1).unwrap();
    assert_eq!(first.imported, 2);
    assert_eq!(first.duplicates, 0);
    assert_eq!(first.skipped, 2, "header and pending order rows are skipped");

    let second = import_file(&db, &actor, &html_path, 50).unwrap();
    assert_eq!(second.imported, 0);
    assert_eq!(second.duplicates, 2);

    let xml = import_file(&db, &actor, &xml_path, 50).unwrap();
    assert_eq!(xml.imported, 1);

    let trades = db.list_trades(&user.id, &TradeFilters::default()).unwrap();
    assert_eq!(trades.len(), 3);

    let gbp = trades.iter().find(|t| t.symbol == "GBP/USD").unwrap();
    assert_eq!(gbp.direction, Direction::Buy);
    assert!((gbp.profit_loss - 600.0).abs() < 1e-9);
    assert_eq!(gbp.duration_minutes, 75);
    assert_eq!(gbp.tags, vec!["imported"]);

    let jpy = trades.iter().find(|t| t.symbol == "USD/JPY").unwrap();
    assert!((jpy.profit_loss + 50_000.0).abs() < 1e-9);
    assert_eq!(jpy.stop_loss, Some(155.0));

    let gold = trades.iter().find(|t| t.symbol == "XAUUSD").unwrap();
    assert!((gold.profit_loss - 1_000.0).abs() < 1e-9);
    assert!((gold.fees - 6.0).abs() < 1e-9);

    // P/L sign always follows direction and prices.
    for trade in &trades {
        let exit = trade.exit_price.unwrap();
        let favourable = match trade.direction {
            Direction::Buy => exit > trade.entry_price,
            Direction::Sell => exit < trade.entry_price,
        };
        assert_eq!(favourable, trade.profit_loss > 0.0, "{}", trade.symbol);
    }

    let mut session = SessionStore::new(&db);
    session.load(&user.id).unwrap();
    assert_eq!(session.known_tags(), ["imported".to_string()]);

    let stats = dashboard_stats(session.trades(), DateRange::All);
    assert_eq!(stats.total_trades, 3);
    assert_eq!(stats.wins, 2);
    assert!((stats.total_pnl - (600.0 - 50_000.0 + 1_000.0)).abs() < 1e-9);

    // A reopened database sees the same data.
    drop(session);
    drop(db);
    let reopened = Database::new(db_path.to_str().unwrap()).unwrap();
    assert_eq!(reopened.list_trades(&user.id, &TradeFilters::default()).unwrap().len(), 3);
}

#[test]
fn test_file_without_trades_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(dir.path().join("j.db").to_str().unwrap()).unwrap();
    let user = register_user(
        &db,
        None,
        RegisterUserInput {
            email: "a@example.com".into(),
            display_name: "A".into(),
            password: "longenough".into(),
        },
    )
    .unwrap();

    let path = dir.path().join("empty.html");
    fs::write(&path, "<table><tr><td>only row</td></tr></table>").unwrap();
    assert!(matches!(
        import_file(&db, &user.actor(), &path, 50),
        Err(JournalError::NoValidTrades)
    ));

    let path = dir.path().join("notes.txt");
    fs::write(&path, "hello").unwrap();
    assert!(matches!(
        commands::import_file(&db, &user.actor(), &path, 50),
        Err(JournalError::UnsupportedFormat(_))
    ));
}
