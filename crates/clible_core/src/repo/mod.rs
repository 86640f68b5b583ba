//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define one data-access contract per table family.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repositories never orchestrate across entity families.
//! - Simple lookups return `Ok(None)` for absent rows.
//! - Constraint failures surface as `RepoError::ConstraintViolation`, except
//!   the natural-key race inside get-or-create, which re-reads instead.
//! - Text search is case-insensitive substring matching under Unicode case
//!   folding (the `casefold` SQL function), with no wildcard characters.

use crate::db::DbError;
use rusqlite::{Connection, ErrorCode};
use thiserror::Error;

pub mod book_repo;
pub mod bounds_repo;
pub mod session_repo;
pub mod translation_repo;
pub mod verse_repo;

/// Upper bound on insert/re-read rounds for get-or-create style writes.
pub(crate) const MAX_GET_OR_CREATE_ATTEMPTS: usize = 3;

pub type RepoResult<T> = Result<T, RepoError>;

/// Which constraint rejected a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    PrimaryKey,
    ForeignKey,
    Check,
    NotNull,
    Trigger,
    Other,
}

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("{0}")]
    Db(#[from] DbError),
    #[error("constraint violation ({kind:?}): {message}")]
    ConstraintViolation {
        kind: ConstraintKind,
        message: String,
    },
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("invalid persisted data: {0}")]
    InvalidData(String),
    #[error("repository requires table `{0}`; run migrations first")]
    MissingRequiredTable(&'static str),
    #[error("{entity} `{key}` was not settled after {attempts} insert attempts")]
    Contention {
        entity: &'static str,
        key: String,
        attempts: usize,
    },
}

impl RepoError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether this is a constraint violation of the given kind.
    pub fn is_constraint(&self, expected: ConstraintKind) -> bool {
        matches!(self, Self::ConstraintViolation { kind, .. } if *kind == expected)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        match constraint_kind(&value) {
            Some(kind) => Self::ConstraintViolation {
                kind,
                message: value.to_string(),
            },
            None => Self::Db(DbError::Sqlite(value)),
        }
    }
}

fn constraint_kind(err: &rusqlite::Error) -> Option<ConstraintKind> {
    let rusqlite::Error::SqliteFailure(failure, _) = err else {
        return None;
    };
    if failure.code != ErrorCode::ConstraintViolation {
        return None;
    }

    let kind = match failure.extended_code {
        rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE => ConstraintKind::Unique,
        rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => ConstraintKind::PrimaryKey,
        rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => ConstraintKind::ForeignKey,
        rusqlite::ffi::SQLITE_CONSTRAINT_CHECK => ConstraintKind::Check,
        rusqlite::ffi::SQLITE_CONSTRAINT_NOTNULL => ConstraintKind::NotNull,
        rusqlite::ffi::SQLITE_CONSTRAINT_TRIGGER => ConstraintKind::Trigger,
        _ => ConstraintKind::Other,
    };
    Some(kind)
}

/// Fails with `MissingRequiredTable` unless every table exists.
pub(crate) fn ensure_tables(conn: &Connection, tables: &[&'static str]) -> RepoResult<()> {
    for table in tables {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [*table],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }
    Ok(())
}
