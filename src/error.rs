//! Error types for taskstore.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Connection, timeout, or transport failure. Never retried here.
    #[error("storage unavailable: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
