use chrono::Utc;

use crate::calc::{normalize_symbol, profit_loss_or_zero};
use crate::commands::import::generate_fingerprint;
use crate::commands::tags::{normalize_tags, register_tags};
use crate::db::{Database, TradeRepository};
use crate::error::{JournalError, Result};
use crate::models::{Actor, CreateTradeInput, ImportSource, Trade, TradeFilters, TradeUpdate};

pub(crate) fn new_trade_id() -> String {
    format!("TRADE-{}-{}", Utc::now().timestamp_millis(), uuid::Uuid::new_v4())
}

pub(crate) fn duration_minutes(entry_date: i64, exit_date: Option<i64>) -> i64 {
    exit_date.map(|exit| ((exit - entry_date) / 60).max(0)).unwrap_or(0)
}

fn positive(field: &str, value: f64) -> Result<f64> {
    if !value.is_finite() {
        return Err(JournalError::invalid_number(field, value));
    }
    if value <= 0.0 {
        return Err(JournalError::InvalidInput(format!("{} must be greater than 0", field)));
    }
    Ok(value)
}

/// Re-derives everything computed from the editable fields.
fn refresh_derived(trade: &mut Trade) -> Result<()> {
    if trade.symbol.is_empty() {
        return Err(JournalError::InvalidInput("Symbol is required".to_string()));
    }
    positive("Entry price", trade.entry_price)?;
    positive("Lot size", trade.quantity)?;
    if let Some(exit) = trade.exit_price {
        positive("Exit price", exit)?;
    }
    if trade.exit_price.is_some() && trade.exit_date.is_none() {
        trade.exit_date = Some(trade.entry_date);
    }

    trade.profit_loss = profit_loss_or_zero(
        trade.entry_price,
        trade.exit_price,
        trade.quantity,
        trade.direction,
        &trade.symbol,
    )?;
    trade.duration_minutes = duration_minutes(trade.entry_date, trade.exit_date);
    trade.import_fingerprint = Some(generate_fingerprint(
        &trade.symbol,
        trade.entry_price,
        trade.exit_price,
        trade.entry_date,
        trade.direction,
    ));
    Ok(())
}

fn owned_trade(db: &Database, actor: &Actor, id: &str) -> Result<Trade> {
    let trade = db.get_trade(id)?;
    if !actor.can_modify(&trade.user_id) {
        return Err(JournalError::PermissionDenied(format!("trade {} belongs to another user", id)));
    }
    Ok(trade)
}

pub fn create_trade(db: &Database, actor: &Actor, input: CreateTradeInput) -> Result<Trade> {
    let direction = input
        .direction
        .ok_or_else(|| JournalError::InvalidInput("Type must be Buy or Sell".to_string()))?;
    let now = Utc::now().timestamp();

    let mut trade = Trade {
        id: new_trade_id(),
        user_id: actor.user_id.clone(),
        symbol: normalize_symbol(&input.symbol),
        direction,
        entry_price: input.entry_price,
        exit_price: input.exit_price,
        quantity: input.quantity,
        stop_loss: input.stop_loss,
        take_profit: input.take_profit,
        entry_date: input.entry_date,
        exit_date: input.exit_date,
        duration_minutes: 0,
        profit_loss: 0.0,
        fees: input.fees,
        notes: input.notes,
        tags: normalize_tags(&input.tags),
        session: input.session,
        import_fingerprint: None,
        import_source: ImportSource::UserCreated,
        created_at: now,
        updated_at: now,
    };
    refresh_derived(&mut trade)?;

    db.insert_trade(&trade)?;
    register_tags(db, &actor.user_id, &trade.tags)?;
    log::info!("Created trade {} ({} {})", trade.id, trade.direction, trade.symbol);
    Ok(trade)
}

pub fn get_trade(db: &Database, actor: &Actor, id: &str) -> Result<Trade> {
    owned_trade(db, actor, id)
}

pub fn list_trades(db: &Database, actor: &Actor, filters: &TradeFilters) -> Result<Vec<Trade>> {
    db.list_trades(&actor.user_id, filters)
}

pub fn update_trade(db: &Database, actor: &Actor, id: &str, update: TradeUpdate) -> Result<Trade> {
    let mut trade = owned_trade(db, actor, id)?;

    if let Some(symbol) = update.symbol {
        trade.symbol = normalize_symbol(&symbol);
    }
    if let Some(direction) = update.direction {
        trade.direction = direction;
    }
    if let Some(entry_price) = update.entry_price {
        trade.entry_price = entry_price;
    }
    if let Some(exit_price) = update.exit_price {
        trade.exit_price = Some(exit_price);
    }
    if let Some(quantity) = update.quantity {
        trade.quantity = quantity;
    }
    if let Some(stop_loss) = update.stop_loss {
        trade.stop_loss = Some(stop_loss);
    }
    if let Some(take_profit) = update.take_profit {
        trade.take_profit = Some(take_profit);
    }
    if let Some(entry_date) = update.entry_date {
        trade.entry_date = entry_date;
    }
    if let Some(exit_date) = update.exit_date {
        trade.exit_date = Some(exit_date);
    }
    if let Some(fees) = update.fees {
        trade.fees = fees;
    }
    if let Some(notes) = update.notes {
        trade.notes = notes;
    }
    if let Some(tags) = update.tags {
        trade.tags = normalize_tags(&tags);
    }
    if let Some(session) = update.session {
        trade.session = Some(session);
    }

    refresh_derived(&mut trade)?;
    trade.updated_at = Utc::now().timestamp();

    db.update_trade(&trade)?;
    register_tags(db, &trade.user_id, &trade.tags)?;
    Ok(trade)
}

pub fn delete_trade(db: &Database, actor: &Actor, id: &str) -> Result<()> {
    owned_trade(db, actor, id)?;
    db.delete_trade(id)?;
    log::info!("Deleted trade {}", id);
    Ok(())
}

/// Copies a trade under a new id. The copy is a manual entry.
pub fn duplicate_trade(db: &Database, actor: &Actor, id: &str) -> Result<Trade> {
    let original = owned_trade(db, actor, id)?;
    let now = Utc::now().timestamp();

    let notes = if original.notes.is_empty() {
        "(Copy)".to_string()
    } else {
        format!("{} (Copy)", original.notes)
    };

    let copy = Trade {
        id: new_trade_id(),
        notes,
        import_source: ImportSource::UserCreated,
        created_at: now,
        updated_at: now,
        ..original
    };

    db.insert_trade(&copy)?;
    Ok(copy)
}

/// Deletes every trade the actor owns.
pub fn delete_all_trades(db: &Database, actor: &Actor) -> Result<usize> {
    let count = db.delete_user_trades(&actor.user_id)?;
    log::info!("Deleted {} trades for {}", count, actor.user_id);
    Ok(count)
}

/// Recomputes stored P/L with the current calculator. Returns how many
/// trades changed.
pub fn recalculate_trades(db: &Database, actor: &Actor) -> Result<usize> {
    let mut changed = 0;
    for mut trade in db.list_trades(&actor.user_id, &TradeFilters::default())? {
        let before = (trade.profit_loss, trade.duration_minutes, trade.import_fingerprint.clone());
        refresh_derived(&mut trade)?;
        if before != (trade.profit_loss, trade.duration_minutes, trade.import_fingerprint.clone()) {
            trade.updated_at = Utc::now().timestamp();
            db.update_trade(&trade)?;
            changed += 1;
        }
    }
    if changed > 0 {
        log::info!("Recalculated {} trades", changed);
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::trade_repository::tests::seed_user;
    use crate::models::{Direction, Role};
    use approx::assert_relative_eq;

    fn setup() -> (Database, Actor) {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "u1");
        seed_user(&db, "u2");
        (db, Actor { user_id: "u1".into(), role: Role::User })
    }

    fn eurusd_input() -> CreateTradeInput {
        CreateTradeInput {
            symbol: "eurusd".into(),
            direction: Some(Direction::Buy),
            entry_price: 1.1,
            exit_price: Some(1.105),
            quantity: 1.0,
            entry_date: 1_704_067_200,
            exit_date: Some(1_704_067_200 + 90 * 60),
            tags: vec!["#Breakout".into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_create_computes_profit_loss() {
        let (db, actor) = setup();
        let trade = create_trade(&db, &actor, eurusd_input()).unwrap();

        assert!(trade.id.starts_with("TRADE-"));
        assert_eq!(trade.symbol, "EUR/USD");
        assert_relative_eq!(trade.profit_loss, 500.0);
        assert_eq!(trade.duration_minutes, 90);
        assert_eq!(trade.tags, vec!["breakout"]);
        assert!(trade.import_fingerprint.is_some());
        assert_eq!(crate::commands::tags::list_tags(&db, &actor).unwrap(), vec!["breakout"]);
    }

    #[test]
    fn test_create_rejects_bad_input() {
        let (db, actor) = setup();
        let mut input = eurusd_input();
        input.direction = None;
        assert!(matches!(create_trade(&db, &actor, input), Err(JournalError::InvalidInput(_))));

        let mut input = eurusd_input();
        input.entry_price = f64::NAN;
        assert!(matches!(create_trade(&db, &actor, input), Err(JournalError::InvalidNumber { .. })));

        let mut input = eurusd_input();
        input.quantity = 0.0;
        assert!(create_trade(&db, &actor, input).is_err());
    }

    #[test]
    fn test_update_recomputes_profit_loss() {
        let (db, actor) = setup();
        let trade = create_trade(&db, &actor, eurusd_input()).unwrap();

        let updated = update_trade(
            &db,
            &actor,
            &trade.id,
            TradeUpdate { direction: Some(Direction::Sell), ..Default::default() },
        )
        .unwrap();
        assert_relative_eq!(updated.profit_loss, -500.0);
        assert_relative_eq!(db.get_trade(&trade.id).unwrap().profit_loss, -500.0);
    }

    #[test]
    fn test_only_owner_or_admin_may_delete() {
        let (db, owner) = setup();
        let trade = create_trade(&db, &owner, eurusd_input()).unwrap();

        let stranger = Actor { user_id: "u2".into(), role: Role::User };
        assert!(matches!(
            delete_trade(&db, &stranger, &trade.id),
            Err(JournalError::PermissionDenied(_))
        ));

        let admin = Actor { user_id: "u2".into(), role: Role::Admin };
        delete_trade(&db, &admin, &trade.id).unwrap();
        assert!(matches!(get_trade(&db, &owner, &trade.id), Err(JournalError::NotFound(_))));
    }

    #[test]
    fn test_duplicate_marks_copy() {
        let (db, actor) = setup();
        let trade = create_trade(&db, &actor, eurusd_input()).unwrap();
        let copy = duplicate_trade(&db, &actor, &trade.id).unwrap();

        assert_ne!(copy.id, trade.id);
        assert_eq!(copy.notes, "(Copy)");
        assert_eq!(list_trades(&db, &actor, &TradeFilters::default()).unwrap().len(), 2);
        assert_eq!(delete_all_trades(&db, &actor).unwrap(), 2);
    }

    #[test]
    fn test_recalculate_fixes_stale_values() {
        let (db, actor) = setup();
        let mut trade = create_trade(&db, &actor, eurusd_input()).unwrap();
        trade.profit_loss = 1.0;
        db.update_trade(&trade).unwrap();

        assert_eq!(recalculate_trades(&db, &actor).unwrap(), 1);
        assert_relative_eq!(db.get_trade(&trade.id).unwrap().profit_loss, 500.0);
        assert_eq!(recalculate_trades(&db, &actor).unwrap(), 0);
    }
}
