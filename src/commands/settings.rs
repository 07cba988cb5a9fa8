use rusqlite::ToSql;

use crate::commands::users::require_admin;
use crate::db::Database;
use crate::error::{JournalError, Result};
use crate::models::{Actor, Settings, UpdateSettingsInput};

pub fn get_settings(db: &Database) -> Result<Settings> {
    let conn = db.lock()?;

    let settings = conn.query_row(
        "SELECT id, site_name, default_currency, default_lot_size, allow_registration, created_at, updated_at FROM settings WHERE id = 1",
        [],
        |row| {
            Ok(Settings {
                id: row.get(0)?,
                site_name: row.get(1)?,
                default_currency: row.get(2)?,
                default_lot_size: row.get(3)?,
                allow_registration: row.get::<_, i32>(4)? == 1,
                created_at: row.get(5)?,
                updated_at: row.get(6)?,
            })
        },
    )?;

    Ok(settings)
}

pub fn update_settings(db: &Database, actor: &Actor, settings: UpdateSettingsInput) -> Result<Settings> {
    require_admin(actor)?;
    {
        let conn = db.lock()?;

        // Build dynamic UPDATE query
        let mut updates = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(val) = settings.site_name {
            let val = val.trim().to_string();
            if val.is_empty() {
                return Err(JournalError::InvalidInput("Site name cannot be empty".to_string()));
            }
            updates.push("site_name = ?");
            values.push(Box::new(val));
        }
        if let Some(val) = settings.default_currency {
            let val = val.trim().to_uppercase();
            if val.len() != 3 || !val.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(JournalError::InvalidInput(format!(
                    "Currency must be a three-letter code, got '{}'",
                    val
                )));
            }
            updates.push("default_currency = ?");
            values.push(Box::new(val));
        }
        if let Some(val) = settings.default_lot_size {
            if !val.is_finite() || val <= 0.0 {
                return Err(JournalError::invalid_number("default lot size", val));
            }
            updates.push("default_lot_size = ?");
            values.push(Box::new(val));
        }
        if let Some(val) = settings.allow_registration {
            updates.push("allow_registration = ?");
            values.push(Box::new(val as i32));
        }

        updates.push("updated_at = strftime('%s', 'now')");

        let query = format!("UPDATE settings SET {} WHERE id = 1", updates.join(", "));
        let params: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();

        conn.execute(&query, params.as_slice())?;
    }

    log::info!("Site settings updated by {}", actor.user_id);
    get_settings(db)
}
