//! Per-user working state for a front end.
//!
//! A [`SessionStore`] holds the signed-in user, their trades and their
//! known tags. Nothing is shared globally; callers load a user, work on the
//! cached data and persist tag changes explicitly.

use crate::commands::tags::{list_tags, normalize_tags, register_tags};
use crate::commands::users::get_user;
use crate::db::{Database, TradeRepository};
use crate::error::{JournalError, Result};
use crate::models::{Actor, Trade, TradeFilters, User};

pub struct SessionStore<'db> {
    db: &'db Database,
    user: Option<User>,
    trades: Vec<Trade>,
    known_tags: Vec<String>,
    pending_tags: Vec<String>,
}

impl<'db> SessionStore<'db> {
    pub fn new(db: &'db Database) -> Self {
        Self {
            db,
            user: None,
            trades: Vec::new(),
            known_tags: Vec::new(),
            pending_tags: Vec::new(),
        }
    }

    /// Replaces the session contents with the given user's data.
    pub fn load(&mut self, user_id: &str) -> Result<()> {
        let user = get_user(self.db, user_id)?;
        if user.disabled {
            return Err(JournalError::PermissionDenied("account is disabled".to_string()));
        }
        let actor = user.actor();

        self.trades = self.db.list_trades(&user.id, &TradeFilters::default())?;
        self.known_tags = list_tags(self.db, &actor)?;
        self.pending_tags.clear();
        self.user = Some(user);

        log::debug!("Session loaded: {} trades, {} tags", self.trades.len(), self.known_tags.len());
        Ok(())
    }

    /// Writes tags added during the session. Returns how many were new.
    pub fn persist(&mut self) -> Result<usize> {
        let user_id = self.actor()?.user_id;
        let added = register_tags(self.db, &user_id, &self.pending_tags)?;
        self.pending_tags.clear();
        Ok(added)
    }

    pub fn clear(&mut self) {
        self.user = None;
        self.trades.clear();
        self.known_tags.clear();
        self.pending_tags.clear();
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn actor(&self) -> Result<Actor> {
        self.user
            .as_ref()
            .map(User::actor)
            .ok_or_else(|| JournalError::PermissionDenied("no user signed in".to_string()))
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn known_tags(&self) -> &[String] {
        &self.known_tags
    }

    /// Adds tags to the known set; they are stored on the next
    /// [`persist`](Self::persist).
    pub fn add_tags(&mut self, tags: &[String]) {
        for tag in normalize_tags(tags) {
            if !self.known_tags.contains(&tag) {
                self.known_tags.push(tag.clone());
                self.pending_tags.push(tag);
            }
        }
        self.known_tags.sort();
    }
}
