//! Application configuration
//!
//! Loaded from an optional JSON file, then overridden by environment
//! variables. Site-wide settings edited by admins live in the database, not
//! here.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::commands::import::DEFAULT_BATCH_SIZE;

pub const DB_PATH_ENV: &str = "TRADE_JOURNAL_DB";
pub const BATCH_SIZE_ENV: &str = "TRADE_JOURNAL_BATCH_SIZE";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite database file
    pub database_path: PathBuf,
    /// Trades inserted per transaction during imports
    pub import_batch_size: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("trade_journal.db"),
            import_batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AppConfig =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        config.with_env_overrides()
    }

    /// File if given, defaults otherwise; environment wins in both cases.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::default().with_env_overrides(),
        }
    }

    fn with_env_overrides(self) -> Result<Self> {
        self.apply_overrides(
            std::env::var(DB_PATH_ENV).ok(),
            std::env::var(BATCH_SIZE_ENV).ok(),
        )
    }

    fn apply_overrides(mut self, db_path: Option<String>, batch_size: Option<String>) -> Result<Self> {
        if let Some(db_path) = db_path.filter(|p| !p.trim().is_empty()) {
            self.database_path = PathBuf::from(db_path);
        }
        if let Some(batch_size) = batch_size {
            self.import_batch_size = batch_size
                .trim()
                .parse()
                .with_context(|| format!("{} must be a positive integer", BATCH_SIZE_ENV))?;
        }
        if self.import_batch_size == 0 {
            anyhow::bail!("import batch size must be greater than 0");
        }
        Ok(self)
    }

    pub fn database_path_str(&self) -> Result<&str> {
        self.database_path
            .to_str()
            .context("Database path is not valid UTF-8")
    }
}
