use thiserror::Error;

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("No valid trades found in file")]
    NoValidTrades,

    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Invalid number for {field}: {value}")]
    InvalidNumber { field: String, value: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid email or password")]
    AuthenticationFailed,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, JournalError>;

impl JournalError {
    pub fn invalid_number(field: &str, value: impl ToString) -> Self {
        JournalError::InvalidNumber {
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

impl From<rusqlite::Error> for JournalError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => JournalError::NotFound("record".to_string()),
            other => JournalError::Database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for JournalError {
    fn from(err: serde_json::Error) -> Self {
        JournalError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for JournalError {
    fn from(err: csv::Error) -> Self {
        JournalError::Parse(err.to_string())
    }
}

impl From<quick_xml::Error> for JournalError {
    fn from(err: quick_xml::Error) -> Self {
        JournalError::Parse(err.to_string())
    }
}
