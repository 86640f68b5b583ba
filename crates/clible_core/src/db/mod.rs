//! SQLite storage bootstrap, schema migrations and reference-data seeding.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the clible core.
//! - Apply versioned schema migrations exactly once each.
//! - Seed static book reference data.
//!
//! # Invariants
//! - Applied migrations are recorded in `_migrations` and mirrored to
//!   `PRAGMA user_version`.
//! - Core code must not read/write application data before migrations succeed.
//! - A migration failure is fatal for startup; callers must not continue.

use std::path::PathBuf;
use thiserror::Error;

mod functions;
pub mod migrations;
mod open;
pub mod seed;

pub use functions::register_functions;
pub use migrations::SchemaMigrationError;
pub use open::{open_db, open_db_in_memory, with_db, OpenOptions};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("schema migration failed: {0}")]
    Migration(#[from] SchemaMigrationError),
    #[error("failed to create storage directory `{}`: {source}", path.display())]
    StorageDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid bundled book data: {0}")]
    Seed(#[from] serde_json::Error),
}

impl DbError {
    /// Whether this error must halt startup rather than be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Migration(_))
    }
}
