use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::commands::tags::register_tags;
use crate::commands::trades::new_trade_id;
use crate::db::{Database, TradeRepository};
use crate::error::{JournalError, Result};
use crate::models::{Actor, Direction, ImportSource, Trade};
use crate::parsers::dates::day_of;
use crate::parsers::{parse_import, parse_strict_csv, ImportFormat, NormalizedTrade, SkippedRow};

pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Duplicate key: symbol, prices, entry day and direction.
pub fn generate_fingerprint(
    symbol: &str,
    entry_price: f64,
    exit_price: Option<f64>,
    entry_date: i64,
    direction: Direction,
) -> String {
    let exit = exit_price
        .map(|p| format!("{:.8}", p))
        .unwrap_or_else(|| "open".to_string());
    format!(
        "{}|{:.8}|{}|{}|{}",
        symbol.trim().to_uppercase(),
        entry_price,
        exit,
        day_of(entry_date),
        direction.as_db_str()
    )
}

fn fingerprint_of(trade: &NormalizedTrade) -> String {
    generate_fingerprint(
        &trade.symbol,
        trade.entry_price,
        trade.exit_price,
        trade.entry_date,
        trade.direction,
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewTrade {
    pub trade: NormalizedTrade,
    pub fingerprint: String,
    pub is_duplicate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportPreview {
    pub format: ImportFormat,
    pub trades: Vec<PreviewTrade>,
    pub skipped: Vec<SkippedRow>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportResult {
    pub imported: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowError {
    pub line: u64,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrictImportResult {
    pub imported: usize,
    pub duplicates: usize,
    pub invalid_rows: Vec<RowError>,
}

pub fn detect_format(path: &Path) -> Result<ImportFormat> {
    ImportFormat::from_path(path)
}

/// Parses a file and flags rows the repository (or an earlier row of the
/// same file) already holds. Nothing is written.
pub fn preview_import(
    repo: &dyn TradeRepository,
    user_id: &str,
    format: ImportFormat,
    content: &str,
) -> Result<ImportPreview> {
    let parsed = parse_import(format, content)?;
    let mut seen = HashSet::new();
    let mut trades = Vec::with_capacity(parsed.trades.len());

    for trade in parsed.trades {
        let fingerprint = fingerprint_of(&trade);
        let is_duplicate =
            !seen.insert(fingerprint.clone()) || repo.fingerprint_exists(user_id, &fingerprint)?;
        trades.push(PreviewTrade { trade, fingerprint, is_duplicate });
    }

    Ok(ImportPreview { format, trades, skipped: parsed.skipped })
}

fn to_trade(normalized: NormalizedTrade, user_id: &str, fingerprint: String, source: ImportSource) -> Trade {
    let now = Utc::now().timestamp();
    Trade {
        id: new_trade_id(),
        user_id: user_id.to_string(),
        symbol: normalized.symbol,
        direction: normalized.direction,
        entry_price: normalized.entry_price,
        exit_price: normalized.exit_price,
        quantity: normalized.lot_size,
        stop_loss: normalized.stop_loss,
        take_profit: normalized.take_profit,
        entry_date: normalized.entry_date,
        exit_date: normalized.exit_date,
        duration_minutes: normalized.duration_minutes,
        profit_loss: normalized.profit_loss,
        fees: normalized.commission,
        notes: normalized.notes,
        tags: normalized.tags,
        session: normalized.session,
        import_fingerprint: Some(fingerprint),
        import_source: source,
        created_at: now,
        updated_at: now,
    }
}

/// Drops duplicates and inserts the rest in batches, one transaction per
/// batch. Returns `(imported, duplicates)`.
pub fn store_normalized(
    repo: &dyn TradeRepository,
    user_id: &str,
    trades: Vec<NormalizedTrade>,
    source: ImportSource,
    batch_size: usize,
) -> Result<(usize, usize)> {
    let mut seen = HashSet::new();
    let mut fresh = Vec::with_capacity(trades.len());
    let mut duplicates = 0;

    for normalized in trades {
        let fingerprint = fingerprint_of(&normalized);
        if seen.contains(&fingerprint) || repo.fingerprint_exists(user_id, &fingerprint)? {
            duplicates += 1;
            continue;
        }
        seen.insert(fingerprint.clone());
        fresh.push(to_trade(normalized, user_id, fingerprint, source));
    }

    let mut imported = 0;
    for (idx, batch) in fresh.chunks(batch_size.max(1)).enumerate() {
        imported += repo.insert_batch(batch)?;
        log::debug!("Inserted batch {} ({} trades)", idx + 1, batch.len());
    }

    Ok((imported, duplicates))
}

/// Lenient import of MetaTrader content already read into memory.
pub fn import_content(
    db: &Database,
    actor: &Actor,
    format: ImportFormat,
    content: &str,
    batch_size: usize,
) -> Result<ImportResult> {
    let parsed = parse_import(format, content)?;
    if parsed.trades.is_empty() {
        return Err(JournalError::NoValidTrades);
    }

    let tags: Vec<String> = parsed
        .trades
        .iter()
        .flat_map(|t| t.tags.iter().cloned())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let (imported, duplicates) =
        store_normalized(db, &actor.user_id, parsed.trades, ImportSource::FileImport, batch_size)?;
    register_tags(db, &actor.user_id, &tags)?;

    for skip in &parsed.skipped {
        log::warn!("Skipped row {}: {}", skip.row, skip.reason);
    }
    log::info!(
        "Imported {} trades ({} duplicates, {} skipped)",
        imported,
        duplicates,
        parsed.skipped.len()
    );

    Ok(ImportResult {
        imported,
        duplicates,
        skipped: parsed.skipped.len(),
        errors: parsed
            .skipped
            .iter()
            .map(|s| format!("Row {}: {}", s.row, s.reason))
            .collect(),
    })
}

pub fn import_file(db: &Database, actor: &Actor, path: &Path, batch_size: usize) -> Result<ImportResult> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    log::info!("Importing {} as {:?}", path.display(), format);
    import_content(db, actor, format, &content, batch_size)
}

/// Imports the valid rows of a strict-template CSV and reports the rest.
pub fn import_strict_csv(
    db: &Database,
    actor: &Actor,
    content: &str,
    batch_size: usize,
) -> Result<StrictImportResult> {
    let report = parse_strict_csv(content)?;
    let invalid_rows: Vec<RowError> = report
        .invalid_rows()
        .into_iter()
        .map(|row| RowError { line: row.line, errors: row.errors.clone() })
        .collect();

    let valid = report.valid_trades();
    let tags: Vec<String> = valid.iter().flat_map(|t| t.tags.iter().cloned()).collect();

    let (imported, duplicates) =
        store_normalized(db, &actor.user_id, valid, ImportSource::CsvImport, batch_size)?;
    register_tags(db, &actor.user_id, &tags)?;

    log::info!(
        "Strict CSV import: {} imported, {} duplicates, {} invalid rows",
        imported,
        duplicates,
        invalid_rows.len()
    );

    Ok(StrictImportResult { imported, duplicates, invalid_rows })
}
