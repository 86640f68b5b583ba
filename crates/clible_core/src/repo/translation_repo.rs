//! Translation repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Resolve translations by natural key, creating them on first reference.
//! - Maintain translation metadata.
//!
//! # Invariants
//! - `get_or_create` never surfaces the unique-key race: concurrent callers
//!   for one abbreviation observe the same id and leave one row.
//! - Deleting a translation cascades its verses and queries.

use crate::model::translation::{normalize_abbreviation, NewTranslation, Translation, TranslationId};
use crate::repo::{ensure_tables, RepoError, RepoResult, MAX_GET_OR_CREATE_ATTEMPTS};
use rusqlite::{params, Connection, OptionalExtension, Row};

const TRANSLATION_SELECT_SQL: &str = "SELECT
    id,
    abbreviation,
    name,
    language,
    created_at
FROM translations";

/// Repository interface for translation rows.
pub trait TranslationRepository {
    /// Returns the id for `translation.abbreviation`, inserting it if absent.
    fn get_or_create(&self, translation: &NewTranslation) -> RepoResult<TranslationId>;
    fn get(&self, id: TranslationId) -> RepoResult<Option<Translation>>;
    /// Case-insensitive exact lookup by abbreviation.
    fn find_by_abbreviation(&self, abbreviation: &str) -> RepoResult<Option<Translation>>;
    fn list(&self) -> RepoResult<Vec<Translation>>;
    /// Substring match on abbreviation or name, insertion order.
    fn search(&self, term: &str) -> RepoResult<Vec<Translation>>;
    fn update_metadata(&self, id: TranslationId, name: &str, language: &str) -> RepoResult<()>;
    fn delete(&self, id: TranslationId) -> RepoResult<()>;
}

/// SQLite-backed translation repository.
pub struct SqliteTranslationRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTranslationRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables(conn, &["translations"])?;
        Ok(Self { conn })
    }
}

impl TranslationRepository for SqliteTranslationRepository<'_> {
    fn get_or_create(&self, translation: &NewTranslation) -> RepoResult<TranslationId> {
        let abbreviation = normalize_abbreviation(&translation.abbreviation);

        for _ in 0..MAX_GET_OR_CREATE_ATTEMPTS {
            let inserted: Option<TranslationId> = self
                .conn
                .query_row(
                    "INSERT INTO translations (abbreviation, name, language)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(abbreviation) DO NOTHING
                     RETURNING id;",
                    params![
                        abbreviation.as_str(),
                        translation.name.as_str(),
                        translation.language.as_str()
                    ],
                    |row| row.get("id"),
                )
                .optional()?;
            if let Some(id) = inserted {
                return Ok(id);
            }

            // Lost the race or the row already existed; the winner is visible now
            // unless it was deleted in between, in which case insert again.
            if let Some(existing) = self.find_id(&abbreviation)? {
                return Ok(existing);
            }
        }

        Err(RepoError::Contention {
            entity: "translation",
            key: abbreviation,
            attempts: MAX_GET_OR_CREATE_ATTEMPTS,
        })
    }

    fn get(&self, id: TranslationId) -> RepoResult<Option<Translation>> {
        self.conn
            .query_row(
                &format!("{TRANSLATION_SELECT_SQL} WHERE id = ?1;"),
                [id],
                parse_translation_row,
            )
            .optional()
            .map_err(RepoError::from)
    }

    fn find_by_abbreviation(&self, abbreviation: &str) -> RepoResult<Option<Translation>> {
        self.conn
            .query_row(
                &format!("{TRANSLATION_SELECT_SQL} WHERE abbreviation = ?1;"),
                [normalize_abbreviation(abbreviation)],
                parse_translation_row,
            )
            .optional()
            .map_err(RepoError::from)
    }

    fn list(&self) -> RepoResult<Vec<Translation>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{TRANSLATION_SELECT_SQL} ORDER BY id ASC;"))?;
        let rows = stmt.query_map([], parse_translation_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(RepoError::from)
    }

    fn search(&self, term: &str) -> RepoResult<Vec<Translation>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TRANSLATION_SELECT_SQL}
             WHERE instr(casefold(abbreviation), casefold(?1)) > 0
                OR instr(casefold(name), casefold(?1)) > 0
             ORDER BY id ASC;"
        ))?;
        let rows = stmt.query_map([term.trim()], parse_translation_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(RepoError::from)
    }

    fn update_metadata(&self, id: TranslationId, name: &str, language: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE translations SET name = ?2, language = ?3 WHERE id = ?1;",
            params![id, name, language],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("translation", id));
        }
        Ok(())
    }

    fn delete(&self, id: TranslationId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM translations WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::not_found("translation", id));
        }
        Ok(())
    }
}

impl SqliteTranslationRepository<'_> {
    fn find_id(&self, abbreviation: &str) -> RepoResult<Option<TranslationId>> {
        self.conn
            .query_row(
                "SELECT id FROM translations WHERE abbreviation = ?1;",
                [abbreviation],
                |row| row.get("id"),
            )
            .optional()
            .map_err(RepoError::from)
    }
}

fn parse_translation_row(row: &Row<'_>) -> rusqlite::Result<Translation> {
    Ok(Translation {
        id: row.get("id")?,
        abbreviation: row.get("abbreviation")?,
        name: row.get("name")?,
        language: row.get("language")?,
        created_at: row.get("created_at")?,
    })
}
