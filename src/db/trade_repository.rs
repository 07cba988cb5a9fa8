use rusqlite::types::Type;
use rusqlite::{params, Connection, ToSql};
use std::sync::Mutex;

use crate::db::Database;
use crate::error::{JournalError, Result};
use crate::models::{Direction, ImportSource, Trade, TradeFilters};

/// Storage for trades. All trade persistence goes through this trait.
pub trait TradeRepository {
    fn list_trades(&self, user_id: &str, filters: &TradeFilters) -> Result<Vec<Trade>>;
    fn get_trade(&self, id: &str) -> Result<Trade>;
    fn insert_trade(&self, trade: &Trade) -> Result<()>;
    /// Inserts all trades or none.
    fn insert_batch(&self, trades: &[Trade]) -> Result<usize>;
    fn update_trade(&self, trade: &Trade) -> Result<()>;
    fn delete_trade(&self, id: &str) -> Result<bool>;
    fn delete_user_trades(&self, user_id: &str) -> Result<usize>;
    fn fingerprint_exists(&self, user_id: &str, fingerprint: &str) -> Result<bool>;
}

const TRADE_COLUMNS: &str = "id, user_id, symbol, direction, entry_price, exit_price, quantity, \
     stop_loss, take_profit, entry_date, exit_date, duration_minutes, profit_loss, fees, notes, \
     tags, session, import_fingerprint, import_source, created_at, updated_at";

fn map_row_to_trade(row: &rusqlite::Row) -> rusqlite::Result<Trade> {
    let direction: String = row.get("direction")?;
    let tags: String = row.get("tags")?;
    let import_source: String = row.get("import_source")?;

    Ok(Trade {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        symbol: row.get("symbol")?,
        direction: Direction::parse_lenient(&direction).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                Type::Text,
                format!("unknown direction '{}'", direction).into(),
            )
        })?,
        entry_price: row.get("entry_price")?,
        exit_price: row.get("exit_price")?,
        quantity: row.get("quantity")?,
        stop_loss: row.get("stop_loss")?,
        take_profit: row.get("take_profit")?,
        entry_date: row.get("entry_date")?,
        exit_date: row.get("exit_date")?,
        duration_minutes: row.get("duration_minutes")?,
        profit_loss: row.get("profit_loss")?,
        fees: row.get("fees")?,
        notes: row.get("notes")?,
        tags: serde_json::from_str(&tags)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(15, Type::Text, Box::new(e)))?,
        session: row.get("session")?,
        import_fingerprint: row.get("import_fingerprint")?,
        import_source: ImportSource::from_db_str(&import_source),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn insert_with(conn: &Connection, trade: &Trade, verb: &str) -> Result<()> {
    let tags = serde_json::to_string(&trade.tags)?;
    conn.execute(
        &format!(
            "{} INTO trades ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            verb, TRADE_COLUMNS
        ),
        params![
            trade.id,
            trade.user_id,
            trade.symbol,
            trade.direction.as_db_str(),
            trade.entry_price,
            trade.exit_price,
            trade.quantity,
            trade.stop_loss,
            trade.take_profit,
            trade.entry_date,
            trade.exit_date,
            trade.duration_minutes,
            trade.profit_loss,
            trade.fees,
            trade.notes,
            tags,
            trade.session,
            trade.import_fingerprint,
            trade.import_source.as_db_str(),
            trade.created_at,
            trade.updated_at,
        ],
    )?;
    Ok(())
}

impl Database {
    /// Insert or overwrite by id. Used when restoring backups.
    pub fn replace_trades(&self, trades: &[Trade]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for trade in trades {
            insert_with(&tx, trade, "REPLACE")?;
        }
        tx.commit()?;
        Ok(trades.len())
    }
}

impl TradeRepository for Database {
    fn list_trades(&self, user_id: &str, filters: &TradeFilters) -> Result<Vec<Trade>> {
        let conn = self.lock()?;

        let mut query = format!("SELECT {} FROM trades WHERE user_id = ?", TRADE_COLUMNS);
        let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(user_id.to_string())];

        if let Some(symbol) = &filters.symbol {
            query.push_str(" AND symbol LIKE ?");
            params.push(Box::new(format!("%{}%", symbol)));
        }
        if let Some(direction) = filters.direction {
            query.push_str(" AND direction = ?");
            params.push(Box::new(direction.as_db_str()));
        }
        if let Some(tag) = &filters.tag {
            query.push_str(
                " AND EXISTS (SELECT 1 FROM json_each(trades.tags) WHERE json_each.value = ?)",
            );
            params.push(Box::new(tag.clone()));
        }
        if let Some(start_date) = filters.start_date {
            query.push_str(" AND entry_date >= ?");
            params.push(Box::new(start_date));
        }
        if let Some(end_date) = filters.end_date {
            query.push_str(" AND entry_date <= ?");
            params.push(Box::new(end_date));
        }

        query.push_str(" ORDER BY entry_date DESC, created_at DESC");

        if let (Some(page), Some(limit)) = (filters.page, filters.limit) {
            query.push_str(" LIMIT ? OFFSET ?");
            params.push(Box::new(limit));
            params.push(Box::new((page.max(1) - 1) * limit));
        }

        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query)?;
        let trades = stmt
            .query_map(param_refs.as_slice(), map_row_to_trade)?
            .collect::<rusqlite::Result<Vec<Trade>>>()?;
        Ok(trades)
    }

    fn get_trade(&self, id: &str) -> Result<Trade> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM trades WHERE id = ?", TRADE_COLUMNS),
            [id],
            map_row_to_trade,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => JournalError::NotFound(format!("trade {}", id)),
            other => other.into(),
        })
    }

    fn insert_trade(&self, trade: &Trade) -> Result<()> {
        let conn = self.lock()?;
        insert_with(&conn, trade, "INSERT")
    }

    fn insert_batch(&self, trades: &[Trade]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for trade in trades {
            insert_with(&tx, trade, "INSERT")?;
        }
        tx.commit()?;
        Ok(trades.len())
    }

    fn update_trade(&self, trade: &Trade) -> Result<()> {
        let conn = self.lock()?;
        let tags = serde_json::to_string(&trade.tags)?;
        let changed = conn.execute(
            "UPDATE trades SET symbol = ?, direction = ?, entry_price = ?, exit_price = ?, quantity = ?,
                stop_loss = ?, take_profit = ?, entry_date = ?, exit_date = ?, duration_minutes = ?,
                profit_loss = ?, fees = ?, notes = ?, tags = ?, session = ?, updated_at = ?
             WHERE id = ?",
            params![
                trade.symbol,
                trade.direction.as_db_str(),
                trade.entry_price,
                trade.exit_price,
                trade.quantity,
                trade.stop_loss,
                trade.take_profit,
                trade.entry_date,
                trade.exit_date,
                trade.duration_minutes,
                trade.profit_loss,
                trade.fees,
                trade.notes,
                tags,
                trade.session,
                trade.updated_at,
                trade.id,
            ],
        )?;
        if changed == 0 {
            return Err(JournalError::NotFound(format!("trade {}", trade.id)));
        }
        Ok(())
    }

    fn delete_trade(&self, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM trades WHERE id = ?", [id])? > 0)
    }

    fn delete_user_trades(&self, user_id: &str) -> Result<usize> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM trades WHERE user_id = ?", [user_id])?)
    }

    fn fingerprint_exists(&self, user_id: &str, fingerprint: &str) -> Result<bool> {
        let conn = self.lock()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM trades WHERE user_id = ? AND import_fingerprint = ?)",
            [user_id, fingerprint],
            |row| row.get(0),
        )?;
        Ok(exists)
    }
}

/// Non-persistent repository for previews and tests.
#[derive(Default)]
pub struct MemoryTradeRepository {
    trades: Mutex<Vec<Trade>>,
}

impl MemoryTradeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Vec<Trade>) -> T) -> Result<T> {
        let mut trades = self
            .trades
            .lock()
            .map_err(|e| JournalError::Database(e.to_string()))?;
        Ok(f(&mut trades))
    }
}

fn matches_filters(trade: &Trade, filters: &TradeFilters) -> bool {
    filters
        .symbol
        .as_ref()
        .is_none_or(|s| trade.symbol.to_lowercase().contains(&s.to_lowercase()))
        && filters.direction.is_none_or(|d| trade.direction == d)
        && filters.tag.as_ref().is_none_or(|t| trade.tags.contains(t))
        && filters.start_date.is_none_or(|start| trade.entry_date >= start)
        && filters.end_date.is_none_or(|end| trade.entry_date <= end)
}

impl TradeRepository for MemoryTradeRepository {
    fn list_trades(&self, user_id: &str, filters: &TradeFilters) -> Result<Vec<Trade>> {
        self.with(|trades| {
            let mut found: Vec<Trade> = trades
                .iter()
                .filter(|t| t.user_id == user_id && matches_filters(t, filters))
                .cloned()
                .collect();
            found.sort_by(|a, b| {
                b.entry_date
                    .cmp(&a.entry_date)
                    .then(b.created_at.cmp(&a.created_at))
            });
            if let (Some(page), Some(limit)) = (filters.page, filters.limit) {
                let limit = limit.max(0) as usize;
                let offset = (page.max(1) as usize - 1) * limit;
                found = found.into_iter().skip(offset).take(limit).collect();
            }
            found
        })
    }

    fn get_trade(&self, id: &str) -> Result<Trade> {
        self.with(|trades| trades.iter().find(|t| t.id == id).cloned())?
            .ok_or_else(|| JournalError::NotFound(format!("trade {}", id)))
    }

    fn insert_trade(&self, trade: &Trade) -> Result<()> {
        self.insert_batch(std::slice::from_ref(trade)).map(|_| ())
    }

    fn insert_batch(&self, batch: &[Trade]) -> Result<usize> {
        self.with(|trades| {
            if batch.iter().any(|new| trades.iter().any(|t| t.id == new.id)) {
                return Err(JournalError::Database("duplicate trade id".to_string()));
            }
            trades.extend_from_slice(batch);
            Ok(batch.len())
        })?
    }

    fn update_trade(&self, trade: &Trade) -> Result<()> {
        self.with(|trades| match trades.iter_mut().find(|t| t.id == trade.id) {
            Some(existing) => {
                *existing = trade.clone();
                Ok(())
            }
            None => Err(JournalError::NotFound(format!("trade {}", trade.id))),
        })?
    }

    fn delete_trade(&self, id: &str) -> Result<bool> {
        self.with(|trades| {
            let before = trades.len();
            trades.retain(|t| t.id != id);
            trades.len() != before
        })
    }

    fn delete_user_trades(&self, user_id: &str) -> Result<usize> {
        self.with(|trades| {
            let before = trades.len();
            trades.retain(|t| t.user_id != user_id);
            before - trades.len()
        })
    }

    fn fingerprint_exists(&self, user_id: &str, fingerprint: &str) -> Result<bool> {
        self.with(|trades| {
            trades
                .iter()
                .any(|t| t.user_id == user_id && t.import_fingerprint.as_deref() == Some(fingerprint))
        })
    }
}
