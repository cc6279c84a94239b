//! Account info error types.
//!
//! Every backend returns [`AccountInfoError`].  Missing credentials and a
//! malformed `allowed` structure are domain errors; everything else wraps
//! the failure of the persistence layer underneath.

use thiserror::Error;

/// Result alias used throughout the account info stores.
pub type Result<T> = std::result::Result<T, AccountInfoError>;

/// Errors raised by an [`AccountInfo`](crate::account_info::store::AccountInfo) store.
#[derive(Debug, Error)]
pub enum AccountInfoError {
    /// No session is stored; the caller must authorize the account again.
    #[error("Missing account data: the account has not been authorized")]
    MissingAccountData,

    /// The `allowed` structure has a bucket id without a bucket name, or the reverse.
    #[error("Invalid allowed structure: {message}")]
    InvalidAllowed { message: String },

    /// A session field is outside the range every backend can store.
    #[error("Invalid session: {message}")]
    InvalidSession { message: String },

    /// SQLite backend failure.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// File or lock I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted document or column could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The account info file was written by an incompatible version.
    #[error("Unsupported account info file version {version}")]
    UnsupportedVersion { version: u32 },

    /// Atomic replacement of the account info file failed.
    #[error("Failed to persist account info file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

impl AccountInfoError {
    /// Return a stable error code string.
    pub fn code(&self) -> &'static str {
        match self {
            AccountInfoError::MissingAccountData => "MissingAccountData",
            AccountInfoError::InvalidAllowed { .. } => "InvalidAllowed",
            AccountInfoError::InvalidSession { .. } => "InvalidSession",
            AccountInfoError::Sqlite(_) => "Sqlite",
            AccountInfoError::Io(_) => "Io",
            AccountInfoError::Json(_) => "Json",
            AccountInfoError::UnsupportedVersion { .. } => "UnsupportedVersion",
            AccountInfoError::Persist(_) => "Persist",
        }
    }

    /// True when re-authorizing the account would resolve this error.
    pub fn is_missing_account_data(&self) -> bool {
        matches!(self, AccountInfoError::MissingAccountData)
    }
}
