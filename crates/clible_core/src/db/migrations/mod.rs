//! SQLite migration registry and executor.
//!
//! # Responsibility
//! - Register schema migrations ordered by numeric version.
//! - Apply each pending migration in its own IMMEDIATE transaction, so
//!   connections opening the same store at once serialize on the write lock.
//!
//! # Invariants
//! - `version` values are unique and never reordered against recorded history.
//! - A unit is recorded in `_migrations` inside the same transaction that
//!   applies it, so a failed unit leaves no trace.
//! - Applied migration version is mirrored to `PRAGMA user_version`.

use log::{error, info};
use rusqlite::{params, Connection, TransactionBehavior};
use std::collections::BTreeSet;
use thiserror::Error;

/// One versioned schema change unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

/// A row of the `_migrations` tracking table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    pub version: u32,
    pub name: String,
    /// SQLite `datetime('now')` text, UTC.
    pub applied_at: String,
}

/// Fatal schema migration failure. Startup must halt when this is returned.
#[derive(Debug, Error)]
pub enum SchemaMigrationError {
    #[error("migration `{name}` uses reserved version 0")]
    InvalidVersion { name: &'static str },
    #[error("migration version {0} is registered more than once")]
    DuplicateVersion(u32),
    #[error("pending migration {version} is not newer than applied version {last_applied}")]
    OutOfOrder { version: u32, last_applied: u32 },
    #[error("database schema version {db_version} is newer than supported {latest_supported}")]
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    #[error("migration {version} (`{name}`) failed: {source}")]
    UnitFailed {
        version: u32,
        name: &'static str,
        #[source]
        source: rusqlite::Error,
    },
    #[error("migration tracking failed: {0}")]
    Tracking(#[from] rusqlite::Error),
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "reference_tables",
        sql: include_str!("0001_reference_tables.sql"),
    },
    Migration {
        version: 2,
        name: "verses_queries",
        sql: include_str!("0002_verses_queries.sql"),
    },
    Migration {
        version: 3,
        name: "sessions",
        sql: include_str!("0003_sessions.sql"),
    },
    Migration {
        version: 4,
        name: "cache_bounds",
        sql: include_str!("0004_cache_bounds.sql"),
    },
];

const TRACKING_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS _migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);";

/// Returns the built-in migration units in registration order.
pub fn builtin_migrations() -> &'static [Migration] {
    MIGRATIONS
}

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Applies all pending built-in migrations and returns how many ran.
pub fn apply_migrations(conn: &mut Connection) -> Result<usize, SchemaMigrationError> {
    apply_pending(conn, MIGRATIONS)
}

/// Applies every unit in `units` that is not yet recorded.
///
/// Units may be supplied in any order; they run by ascending version.
/// Returns the number of units this call applied, `0` when the schema is
/// current. Concurrent callers on separate connections serialize on the
/// write lock; a unit recorded by another connection meanwhile is skipped.
///
/// # Errors
/// - `InvalidVersion` / `DuplicateVersion` when `units` is malformed. Nothing
///   runs in that case.
/// - `OutOfOrder` when a pending unit is older than recorded history.
/// - `UnsupportedSchemaVersion` when the database is ahead of `units`.
/// - `UnitFailed` when a unit's statements fail; earlier units stay applied.
pub fn apply_pending(
    conn: &mut Connection,
    units: &[Migration],
) -> Result<usize, SchemaMigrationError> {
    let ordered = ordered_units(units)?;
    let latest = ordered.last().map_or(0, |migration| migration.version);

    let pending = {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute_batch(TRACKING_TABLE_SQL)?;
        let pending = pending_units(&tx, &ordered, latest)?;
        tx.commit()?;
        pending
    };

    let mut applied = 0;
    for migration in &pending {
        if apply_unit(conn, migration)? {
            applied += 1;
        }
    }

    if applied > 0 {
        info!(
            "event=db_migrate module=db status=ok applied={} version={}",
            applied, latest
        );
    }
    Ok(applied)
}

/// Lists recorded migrations in ascending version order.
///
/// A database that never ran migrations has no tracking table and yields
/// an empty list.
pub fn applied_migrations(
    conn: &Connection,
) -> Result<Vec<AppliedMigration>, SchemaMigrationError> {
    if !tracking_table_exists(conn)? {
        return Ok(Vec::new());
    }
    let mut stmt =
        conn.prepare("SELECT version, name, applied_at FROM _migrations ORDER BY version ASC;")?;
    let mut rows = stmt.query([])?;
    let mut applied = Vec::new();
    while let Some(row) = rows.next()? {
        applied.push(AppliedMigration {
            version: row.get("version")?,
            name: row.get("name")?,
            applied_at: row.get("applied_at")?,
        });
    }
    Ok(applied)
}

fn pending_units<'a>(
    conn: &Connection,
    ordered: &[&'a Migration],
    latest: u32,
) -> Result<Vec<&'a Migration>, SchemaMigrationError> {
    let recorded = recorded_versions(conn)?;
    let last_applied = recorded.iter().next_back().copied().unwrap_or(0);
    let db_version = last_applied.max(current_user_version(conn)?);

    if db_version > latest {
        return Err(SchemaMigrationError::UnsupportedSchemaVersion {
            db_version,
            latest_supported: latest,
        });
    }

    let pending: Vec<&Migration> = ordered
        .iter()
        .copied()
        .filter(|migration| !recorded.contains(&migration.version))
        .collect();
    if let Some(stale) = pending.iter().find(|m| m.version <= last_applied) {
        return Err(SchemaMigrationError::OutOfOrder {
            version: stale.version,
            last_applied,
        });
    }
    Ok(pending)
}

fn ordered_units(units: &[Migration]) -> Result<Vec<&Migration>, SchemaMigrationError> {
    let mut ordered: Vec<&Migration> = units.iter().collect();
    ordered.sort_by_key(|migration| migration.version);

    if let Some(zero) = ordered.iter().find(|migration| migration.version == 0) {
        return Err(SchemaMigrationError::InvalidVersion { name: zero.name });
    }
    for pair in ordered.windows(2) {
        if pair[0].version == pair[1].version {
            return Err(SchemaMigrationError::DuplicateVersion(pair[0].version));
        }
    }
    Ok(ordered)
}

/// Runs one unit under the write lock. Returns `false` when another
/// connection recorded the unit first.
fn apply_unit(conn: &mut Connection, migration: &Migration) -> Result<bool, SchemaMigrationError> {
    let unit_failed = |source: rusqlite::Error| SchemaMigrationError::UnitFailed {
        version: migration.version,
        name: migration.name,
        source,
    };

    // Dropping `tx` on any early return rolls the unit back.
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(unit_failed)?;
    let recorded = recorded_versions(&tx)?;
    if recorded.contains(&migration.version) {
        info!(
            "event=db_migrate_unit module=db status=skipped version={} name={}",
            migration.version, migration.name
        );
        return Ok(false);
    }
    if let Some(&last_applied) = recorded.iter().next_back() {
        if migration.version <= last_applied {
            return Err(SchemaMigrationError::OutOfOrder {
                version: migration.version,
                last_applied,
            });
        }
    }

    let applied = tx
        .execute_batch(migration.sql)
        .and_then(|()| {
            tx.execute(
                "INSERT INTO _migrations (version, name) VALUES (?1, ?2);",
                params![migration.version, migration.name],
            )
        })
        .and_then(|_| tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version)));

    if let Err(err) = applied {
        error!(
            "event=db_migrate module=db status=error version={} name={} error={}",
            migration.version, migration.name, err
        );
        return Err(unit_failed(err));
    }

    tx.commit().map_err(unit_failed)?;
    info!(
        "event=db_migrate_unit module=db status=ok version={} name={}",
        migration.version, migration.name
    );
    Ok(true)
}

fn tracking_table_exists(conn: &Connection) -> Result<bool, SchemaMigrationError> {
    let found: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_migrations';",
        [],
        |row| row.get(0),
    )?;
    Ok(found > 0)
}

fn recorded_versions(conn: &Connection) -> Result<BTreeSet<u32>, SchemaMigrationError> {
    let mut stmt = conn.prepare("SELECT version FROM _migrations;")?;
    let mut rows = stmt.query([])?;
    let mut versions = BTreeSet::new();
    while let Some(row) = rows.next()? {
        versions.insert(row.get::<_, u32>("version")?);
    }
    Ok(versions)
}

fn current_user_version(conn: &Connection) -> Result<u32, SchemaMigrationError> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::{builtin_migrations, ordered_units, Migration, SchemaMigrationError};

    #[test]
    fn builtin_versions_are_strictly_increasing() {
        let versions: Vec<u32> = builtin_migrations().iter().map(|m| m.version).collect();
        assert!(versions.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn ordering_sorts_by_version_and_allows_gaps() {
        let units = [
            Migration {
                version: 10,
                name: "ten",
                sql: "",
            },
            Migration {
                version: 2,
                name: "two",
                sql: "",
            },
        ];
        let ordered = ordered_units(&units).unwrap();
        assert_eq!(ordered[0].version, 2);
        assert_eq!(ordered[1].version, 10);
    }

    #[test]
    fn ordering_rejects_version_zero() {
        let units = [Migration {
            version: 0,
            name: "zero",
            sql: "",
        }];
        let err = ordered_units(&units).unwrap_err();
        assert!(matches!(err, SchemaMigrationError::InvalidVersion { name: "zero" }));
    }
}
