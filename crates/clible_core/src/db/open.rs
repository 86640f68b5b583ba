//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure connection pragmas required by core behavior.
//! - Trigger schema migrations and book seeding before returning a usable
//!   connection.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON` and the `casefold` SQL
//!   function registered.
//! - File connections run in WAL mode unless `OpenOptions::wal` is off.
//! - Returned connections have migrations fully applied when
//!   `OpenOptions::run_migrations` is on (the default).
//! - Repository code reads rows by column name only.

use super::functions::register_functions;
use super::migrations::apply_migrations;
use super::seed::seed_books_if_empty;
use super::{DbError, DbResult};
use log::{error, info, warn};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection bootstrap switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOptions {
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout: Duration,
    /// Requests write-ahead journaling so readers proceed during a write.
    pub wal: bool,
    /// Applies built-in migrations during open.
    pub run_migrations: bool,
    /// Seeds the canonical book table when it is empty. Requires migrations.
    pub seed_books: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            wal: true,
            run_migrations: true,
            seed_books: true,
        }
    }
}

#[derive(Clone, Copy)]
enum OpenMode {
    File,
    Memory,
}

impl OpenMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Memory => "memory",
        }
    }
}

/// Opens a SQLite database file and bootstraps it according to `options`.
///
/// The parent directory is created when missing.
///
/// # Side effects
/// - Performs connection bootstrap, migration and seed checks.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>, options: &OpenOptions) -> DbResult<Connection> {
    let path = path.as_ref();
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode=file");

    if let Err(err) = ensure_parent_dir(path) {
        log_open_failure(OpenMode::File, started_at, "db_dir_failed", &err);
        return Err(err);
    }

    match Connection::open(path) {
        Ok(conn) => finish_open(conn, OpenMode::File, options, started_at),
        Err(err) => {
            let err = DbError::from(err);
            log_open_failure(OpenMode::File, started_at, "db_open_failed", &err);
            Err(err)
        }
    }
}

/// Opens an in-memory SQLite database with default options.
///
/// In-memory databases cannot use WAL; SQLite keeps them in `memory` mode.
pub fn open_db_in_memory() -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode=memory");

    match Connection::open_in_memory() {
        Ok(conn) => finish_open(conn, OpenMode::Memory, &OpenOptions::default(), started_at),
        Err(err) => {
            let err = DbError::from(err);
            log_open_failure(OpenMode::Memory, started_at, "db_open_failed", &err);
            Err(err)
        }
    }
}

/// Opens `path`, runs `work` against the connection, and closes it.
///
/// The connection is released on every exit path, including bootstrap
/// failures and errors returned by `work`.
pub fn with_db<T, E>(
    path: impl AsRef<Path>,
    options: &OpenOptions,
    work: impl FnOnce(&mut Connection) -> Result<T, E>,
) -> Result<T, E>
where
    E: From<DbError>,
{
    let mut conn = open_db(path, options)?;
    let outcome = work(&mut conn);
    if let Err((_, err)) = conn.close() {
        warn!("event=db_close module=db status=error error={err}");
    }
    outcome
}

fn finish_open(
    mut conn: Connection,
    mode: OpenMode,
    options: &OpenOptions,
    started_at: Instant,
) -> DbResult<Connection> {
    match bootstrap_connection(&mut conn, mode, options) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={} duration_ms={}",
                mode.as_str(),
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            let code = if err.is_fatal() {
                "db_migration_failed"
            } else {
                "db_bootstrap_failed"
            };
            log_open_failure(mode, started_at, code, &err);
            Err(err)
        }
    }
}

fn bootstrap_connection(
    conn: &mut Connection,
    mode: OpenMode,
    options: &OpenOptions,
) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(options.busy_timeout)?;
    register_functions(conn)?;

    if options.wal {
        let journal_mode: String =
            conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
        if matches!(mode, OpenMode::File) && !journal_mode.eq_ignore_ascii_case("wal") {
            warn!(
                "event=db_open module=db status=degraded mode={} journal_mode={}",
                mode.as_str(),
                journal_mode
            );
        }
    }

    if options.run_migrations {
        apply_migrations(conn)?;
        if options.seed_books {
            seed_books_if_empty(conn)?;
        }
    }
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> DbResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|source| DbError::StorageDir {
                path: parent.to_path_buf(),
                source,
            }),
        _ => Ok(()),
    }
}

fn log_open_failure(mode: OpenMode, started_at: Instant, code: &str, err: &DbError) {
    error!(
        "event=db_open module=db status=error mode={} duration_ms={} error_code={} error={}",
        mode.as_str(),
        started_at.elapsed().as_millis(),
        code,
        err
    );
}
