use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::commands::settings::{get_settings, update_settings};
use crate::commands::tags::register_tags;
use crate::commands::users::{find_by_email, get_user, insert_user};
use crate::db::{Database, TradeRepository};
use crate::error::Result;
use crate::models::{Actor, Settings, Trade, TradeFilters, UpdateSettingsInput, User};

pub const BACKUP_VERSION: &str = "2.0.0";

/// Full journal backup. Password hashes are never written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupData {
    pub version: String,
    pub export_date: String,
    pub settings: Settings,
    #[serde(default)]
    pub users: Vec<User>,
    pub trades: Vec<Trade>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestoreSummary {
    pub settings_restored: bool,
    pub users_restored: usize,
    pub users_skipped: usize,
    pub trades_restored: usize,
    pub trades_skipped: usize,
}

/// Admins export every account; other users export themselves and their
/// own trades.
pub fn export_all_data(db: &Database, actor: &Actor) -> Result<String> {
    let users = if actor.is_admin() {
        crate::commands::users::list_users(db, actor)?
    } else {
        vec![get_user(db, &actor.user_id)?]
    };

    let mut trades = Vec::new();
    for user in &users {
        trades.extend(db.list_trades(&user.id, &TradeFilters::default())?);
    }

    let backup = BackupData {
        version: BACKUP_VERSION.to_string(),
        export_date: Utc::now().to_rfc3339(),
        settings: get_settings(db)?,
        users,
        trades,
    };

    log::info!("Exported {} trades for {} users", backup.trades.len(), backup.users.len());
    Ok(serde_json::to_string_pretty(&backup)?)
}

/// Restores a backup. Trades are replaced by id. Admins also restore site
/// settings and missing accounts; restored accounts cannot log in until a
/// password is set. Non-admin restores are limited to the actor's own
/// trades.
pub fn import_all_data(db: &Database, actor: &Actor, json_data: &str) -> Result<RestoreSummary> {
    let backup: BackupData = serde_json::from_str(json_data)?;
    let mut summary = RestoreSummary::default();

    if actor.is_admin() {
        // Vet every account before the first write.
        let mut emails = HashSet::new();
        let mut missing = Vec::new();
        for user in &backup.users {
            if get_user(db, &user.id).is_ok() {
                continue;
            }
            if !emails.insert(user.email.clone()) || find_by_email(db, &user.email)?.is_some() {
                log::warn!("Skipping user {}: e-mail {} is already registered", user.id, user.email);
                summary.users_skipped += 1;
                continue;
            }
            missing.push(User {
                password_hash: String::new(),
                updated_at: Utc::now().timestamp(),
                ..user.clone()
            });
        }

        update_settings(
            db,
            actor,
            UpdateSettingsInput {
                site_name: Some(backup.settings.site_name.clone()),
                default_currency: Some(backup.settings.default_currency.clone()),
                default_lot_size: Some(backup.settings.default_lot_size),
                allow_registration: Some(backup.settings.allow_registration),
            },
        )?;
        summary.settings_restored = true;

        for user in &missing {
            insert_user(db, user)?;
            summary.users_restored += 1;
        }
    }

    let known_users: HashSet<String> = if actor.is_admin() {
        crate::commands::users::list_users(db, actor)?.into_iter().map(|u| u.id).collect()
    } else {
        HashSet::from([actor.user_id.clone()])
    };

    let (trades, skipped): (Vec<Trade>, Vec<Trade>) = backup
        .trades
        .into_iter()
        .partition(|t| known_users.contains(&t.user_id));
    for trade in &skipped {
        log::warn!("Skipping trade {} of unknown user {}", trade.id, trade.user_id);
    }
    summary.trades_skipped = skipped.len();

    summary.trades_restored = db.replace_trades(&trades)?;
    for trade in &trades {
        register_tags(db, &trade.user_id, &trade.tags)?;
    }

    log::info!(
        "Restored {} trades ({} skipped), {} users ({} skipped)",
        summary.trades_restored,
        summary.trades_skipped,
        summary.users_restored,
        summary.users_skipped
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::trades::create_trade;
    use crate::commands::users::register_user;
    use crate::models::{CreateTradeInput, Direction, ImportSource, RegisterUserInput};

    fn register(db: &Database, email: &str) -> User {
        register_user(
            db,
            None,
            RegisterUserInput {
                email: email.into(),
                display_name: "T".into(),
                password: "long enough".into(),
            },
        )
        .unwrap()
    }

    fn add_trade(db: &Database, user: &User) -> Trade {
        create_trade(
            db,
            &user.actor(),
            CreateTradeInput {
                symbol: "GBP/JPY".into(),
                direction: Some(Direction::Sell),
                entry_price: 190.0,
                exit_price: Some(189.5),
                quantity: 1.0,
                entry_date: 1_704_067_200,
                tags: vec!["swing".into()],
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_export_omits_password_hashes() {
        let db = Database::open_in_memory().unwrap();
        let admin = register(&db, "admin@example.com");
        add_trade(&db, &admin);

        let json = export_all_data(&db, &admin.actor()).unwrap();
        assert!(!json.contains("argon2"));
        let backup: BackupData = serde_json::from_str(&json).unwrap();
        assert_eq!(backup.version, BACKUP_VERSION);
        assert_eq!(backup.trades.len(), 1);
        assert_eq!(backup.users.len(), 1);
    }

    #[test]
    fn test_user_export_is_scoped() {
        let db = Database::open_in_memory().unwrap();
        let admin = register(&db, "admin@example.com");
        let user = register(&db, "user@example.com");
        add_trade(&db, &admin);
        add_trade(&db, &user);

        let backup: BackupData =
            serde_json::from_str(&export_all_data(&db, &user.actor()).unwrap()).unwrap();
        assert_eq!(backup.users.len(), 1);
        assert!(backup.trades.iter().all(|t| t.user_id == user.id));
    }

    #[test]
    fn test_restore_into_fresh_database() {
        let source = Database::open_in_memory().unwrap();
        let admin = register(&source, "admin@example.com");
        let user = register(&source, "user@example.com");
        let trade = add_trade(&source, &user);
        let json = export_all_data(&source, &admin.actor()).unwrap();

        let target = Database::open_in_memory().unwrap();
        let new_admin = register(&target, "root@example.com");
        let summary = import_all_data(&target, &new_admin.actor(), &json).unwrap();

        assert!(summary.settings_restored);
        assert_eq!(summary.users_restored, 2);
        assert_eq!(summary.trades_restored, 1);
        assert_eq!(target.get_trade(&trade.id).unwrap().profit_loss, trade.profit_loss);

        // Restored accounts have no usable password.
        assert!(crate::commands::users::authenticate(&target, "user@example.com", "long enough").is_err());

        // Restoring again replaces rather than duplicates.
        import_all_data(&target, &new_admin.actor(), &json).unwrap();
        assert_eq!(target.list_trades(&user.id, &TradeFilters::default()).unwrap().len(), 1);
    }

    #[test]
    fn test_restore_skips_accounts_with_taken_email() {
        let source = Database::open_in_memory().unwrap();
        let admin = register(&source, "admin@example.com");
        let user = register(&source, "user@example.com");
        add_trade(&source, &admin);
        let kept = add_trade(&source, &user);
        let json = export_all_data(&source, &admin.actor()).unwrap();

        // Same e-mail, different id.
        let target = Database::open_in_memory().unwrap();
        let local_admin = register(&target, "admin@example.com");
        let summary = import_all_data(&target, &local_admin.actor(), &json).unwrap();

        assert_eq!(summary.users_restored, 1);
        assert_eq!(summary.users_skipped, 1);
        assert_eq!(summary.trades_restored, 1);
        assert_eq!(summary.trades_skipped, 1);
        assert!(target.get_trade(&kept.id).is_ok());
        assert!(get_user(&target, &admin.id).is_err());
        assert_eq!(
            crate::commands::users::list_users(&target, &local_admin.actor()).unwrap().len(),
            2
        );
    }

    #[test]
    fn test_non_admin_restore_skips_foreign_trades() {
        let db = Database::open_in_memory().unwrap();
        let admin = register(&db, "admin@example.com");
        let user = register(&db, "user@example.com");
        add_trade(&db, &admin);
        add_trade(&db, &user);
        let json = export_all_data(&db, &admin.actor()).unwrap();

        let summary = import_all_data(&db, &user.actor(), &json).unwrap();
        assert!(!summary.settings_restored);
        assert_eq!(summary.trades_restored, 1);
        assert_eq!(summary.trades_skipped, 1);
    }

    #[test]
    fn test_backup_without_users_still_loads() {
        // Backups written before accounts existed carry no users list.
        let old_backup_json = r#"{
            "version": "1.0.0",
            "export_date": "2024-01-01T00:00:00+00:00",
            "settings": {
                "id": 1,
                "site_name": "Trade Journal",
                "default_currency": "USD",
                "default_lot_size": 1.0,
                "allow_registration": true,
                "created_at": 1704067200,
                "updated_at": 1704067200
            },
            "trades": [{
                "id": "TRADE-123",
                "user_id": "u1",
                "symbol": "BTCUSDT",
                "direction": "short",
                "entry_price": 42000.0,
                "exit_price": 41500.0,
                "quantity": 0.5,
                "entry_date": 1704067200,
                "exit_date": 1704070800,
                "profit_loss": 250.0,
                "fees": 0.0,
                "notes": "",
                "tags": [],
                "created_at": 1704067200,
                "updated_at": 1704067200
            }]
        }"#;

        let result: std::result::Result<BackupData, _> = serde_json::from_str(old_backup_json);
        assert!(result.is_ok(), "Failed to deserialize old backup: {:?}", result.err());

        let backup = result.unwrap();
        assert!(backup.users.is_empty());
        assert_eq!(backup.trades[0].direction, Direction::Sell);
        assert_eq!(backup.trades[0].import_source, ImportSource::UserCreated);
    }
}
