//! Record store implementations
//!
//! The domain services only see the `LoanStore`, `UserStore`, `Ledger` and
//! `Notifier` traits. `PgStore` backs them with PostgreSQL, `MemoryStore`
//! keeps everything in process for tests and local runs.

mod memory;
mod postgres;

pub use memory::{MemoryStore, SignupToken};
pub use postgres::PgStore;

use thiserror::Error;

/// Record store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row not found".to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.message().to_string())
            }
            _ => StoreError::Database(err.to_string()),
        }
    }
}
