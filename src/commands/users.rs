use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::commands::settings::get_settings;
use crate::db::Database;
use crate::error::{JournalError, Result};
use crate::models::{Actor, RegisterUserInput, Role, User};

const MIN_PASSWORD_LEN: usize = 8;

const USER_COLUMNS: &str =
    "id, email, display_name, role, password_hash, disabled, created_at, updated_at";

fn map_row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    let role: String = row.get("role")?;
    Ok(User {
        id: row.get("id")?,
        email: row.get("email")?,
        display_name: row.get("display_name")?,
        role: Role::from_db_str(&role),
        password_hash: row.get("password_hash")?,
        disabled: row.get::<_, i32>("disabled")? == 1,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub(crate) fn require_admin(actor: &Actor) -> Result<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(JournalError::PermissionDenied("admin role required".to_string()))
    }
}

fn hash_password(password: &str) -> Result<String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(JournalError::InvalidInput(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    let salt = SaltString::encode_b64(uuid::Uuid::new_v4().as_bytes())
        .map_err(|e| JournalError::InvalidInput(e.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| JournalError::InvalidInput(e.to_string()))
}

fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

fn count_users(db: &Database) -> Result<i64> {
    let conn = db.lock()?;
    Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
}

fn count_admins(db: &Database) -> Result<i64> {
    let conn = db.lock()?;
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM users WHERE role = 'admin' AND disabled = 0",
        [],
        |row| row.get(0),
    )?)
}

pub fn get_user(db: &Database, id: &str) -> Result<User> {
    let conn = db.lock()?;
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS),
        [id],
        map_row_to_user,
    )
    .optional()?
    .ok_or_else(|| JournalError::NotFound(format!("user {}", id)))
}

pub(crate) fn find_by_email(db: &Database, email: &str) -> Result<Option<User>> {
    let conn = db.lock()?;
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS),
            [email.trim()],
            map_row_to_user,
        )
        .optional()?)
}

/// Creates an account. The first account becomes admin; after that,
/// self-registration follows the site setting and admins may always add
/// users.
pub fn register_user(db: &Database, actor: Option<&Actor>, input: RegisterUserInput) -> Result<User> {
    let email = input.email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(JournalError::InvalidInput(format!("'{}' is not an e-mail address", input.email)));
    }
    let display_name = input.display_name.trim().to_string();
    if display_name.is_empty() {
        return Err(JournalError::InvalidInput("Display name is required".to_string()));
    }

    let first_user = count_users(db)? == 0;
    if !first_user && !actor.is_some_and(Actor::is_admin) && !get_settings(db)?.allow_registration {
        return Err(JournalError::PermissionDenied("registration is closed".to_string()));
    }
    if find_by_email(db, &email)?.is_some() {
        return Err(JournalError::InvalidInput(format!("{} is already registered", email)));
    }

    let now = Utc::now().timestamp();
    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        email,
        display_name,
        role: if first_user { Role::Admin } else { Role::User },
        password_hash: hash_password(&input.password)?,
        disabled: false,
        created_at: now,
        updated_at: now,
    };

    insert_user(db, &user)?;
    log::info!("Registered {} as {}", user.email, user.role);
    Ok(user)
}

pub(crate) fn insert_user(db: &Database, user: &User) -> Result<()> {
    let conn = db.lock()?;
    conn.execute(
        &format!("INSERT INTO users ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)", USER_COLUMNS),
        params![
            user.id,
            user.email,
            user.display_name,
            user.role.as_db_str(),
            user.password_hash,
            user.disabled as i32,
            user.created_at,
            user.updated_at,
        ],
    )?;
    Ok(())
}

pub fn authenticate(db: &Database, email: &str, password: &str) -> Result<User> {
    let user = find_by_email(db, email)?.ok_or(JournalError::AuthenticationFailed)?;
    if !verify_password(password, &user.password_hash) {
        log::warn!("Failed login for {}", email.trim());
        return Err(JournalError::AuthenticationFailed);
    }
    if user.disabled {
        return Err(JournalError::PermissionDenied("account is disabled".to_string()));
    }
    Ok(user)
}

pub fn list_users(db: &Database, actor: &Actor) -> Result<Vec<User>> {
    require_admin(actor)?;
    let conn = db.lock()?;
    let mut stmt = conn.prepare(&format!("SELECT {} FROM users ORDER BY created_at, email", USER_COLUMNS))?;
    let users = stmt
        .query_map([], map_row_to_user)?
        .collect::<rusqlite::Result<Vec<User>>>()?;
    Ok(users)
}

fn ensure_other_admin_remains(db: &Database, target: &User) -> Result<()> {
    if target.role == Role::Admin && !target.disabled && count_admins(db)? <= 1 {
        return Err(JournalError::InvalidInput("at least one active admin is required".to_string()));
    }
    Ok(())
}

pub fn set_role(db: &Database, actor: &Actor, user_id: &str, role: Role) -> Result<User> {
    require_admin(actor)?;
    let target = get_user(db, user_id)?;
    if role != Role::Admin {
        ensure_other_admin_remains(db, &target)?;
    }

    {
        let conn = db.lock()?;
        conn.execute(
            "UPDATE users SET role = ?, updated_at = ? WHERE id = ?",
            params![role.as_db_str(), Utc::now().timestamp(), user_id],
        )?;
    }
    log::info!("{} is now {}", target.email, role);
    get_user(db, user_id)
}

pub fn set_disabled(db: &Database, actor: &Actor, user_id: &str, disabled: bool) -> Result<User> {
    require_admin(actor)?;
    let target = get_user(db, user_id)?;
    if disabled {
        ensure_other_admin_remains(db, &target)?;
    }

    {
        let conn = db.lock()?;
        conn.execute(
            "UPDATE users SET disabled = ?, updated_at = ? WHERE id = ?",
            params![disabled as i32, Utc::now().timestamp(), user_id],
        )?;
    }
    get_user(db, user_id)
}

/// Changes a password. Users may change their own, admins anyone's.
pub fn reset_password(db: &Database, actor: &Actor, user_id: &str, password: &str) -> Result<()> {
    if !actor.can_modify(user_id) {
        return Err(JournalError::PermissionDenied("cannot change another user's password".to_string()));
    }
    let hash = hash_password(password)?;
    let conn = db.lock()?;
    let changed = conn.execute(
        "UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?",
        params![hash, Utc::now().timestamp(), user_id],
    )?;
    if changed == 0 {
        return Err(JournalError::NotFound(format!("user {}", user_id)));
    }
    Ok(())
}

/// Removes a user together with their trades and tags.
pub fn delete_user(db: &Database, actor: &Actor, user_id: &str) -> Result<()> {
    require_admin(actor)?;
    if actor.user_id == user_id {
        return Err(JournalError::InvalidInput("admins cannot delete themselves".to_string()));
    }
    let target = get_user(db, user_id)?;
    ensure_other_admin_remains(db, &target)?;

    let conn = db.lock()?;
    conn.execute("DELETE FROM users WHERE id = ?", [user_id])?;
    log::info!("Deleted user {}", target.email);
    Ok(())
}
