use chrono::Utc;
use rusqlite::params;

use crate::db::Database;
use crate::error::Result;
use crate::models::Actor;

/// `#Breakout  Trade` -> `breakout-trade`.
pub fn normalize_tag(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('#')
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Normalizes a tag list, dropping blanks and repeats.
pub fn normalize_tags(raw: &[String]) -> Vec<String> {
    let mut tags: Vec<String> = Vec::with_capacity(raw.len());
    for tag in raw.iter().map(|t| normalize_tag(t)) {
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

/// Adds tags to the user's known set. Returns how many were new.
pub fn register_tags(db: &Database, user_id: &str, tags: &[String]) -> Result<usize> {
    let tags = normalize_tags(tags);
    if tags.is_empty() {
        return Ok(0);
    }

    let mut conn = db.lock()?;
    let tx = conn.transaction()?;
    let now = Utc::now().timestamp();
    let mut added = 0;
    for tag in &tags {
        added += tx.execute(
            "INSERT OR IGNORE INTO known_tags (user_id, name, created_at) VALUES (?, ?, ?)",
            params![user_id, tag, now],
        )?;
    }
    tx.commit()?;

    if added > 0 {
        log::debug!("Registered {} new tags for {}", added, user_id);
    }
    Ok(added)
}

pub fn list_tags(db: &Database, actor: &Actor) -> Result<Vec<String>> {
    let conn = db.lock()?;
    let mut stmt = conn.prepare("SELECT name FROM known_tags WHERE user_id = ? ORDER BY name")?;
    let tags = stmt
        .query_map([&actor.user_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(tags)
}
