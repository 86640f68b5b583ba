//! Verse/query repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist fetched verses and the queries that group them.
//! - Serve cache lookups by query natural key.
//!
//! # Invariants
//! - Verses are unique on `(translation_id, book_id, chapter, verse)`;
//!   `upsert_verse` returns the existing row instead of failing.
//! - Queries are unique on `(translation_id, book_id, chapter, range)`;
//!   `create_query` returns the existing row instead of failing.
//! - Query verses are returned in link `position` order.
//! - Callers needing atomic multi-row writes wrap calls in one transaction.

use crate::model::reference::VerseRange;
use crate::model::translation::TranslationId;
use crate::model::verse::{NewQuery, NewVerse, Query, QueryId, QueryKey, Verse, VerseId};
use crate::repo::{ensure_tables, RepoError, RepoResult, MAX_GET_OR_CREATE_ATTEMPTS};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

const QUERY_SELECT_SQL: &str = "SELECT
    id,
    translation_id,
    reference,
    book_id,
    chapter,
    verse_start,
    verse_end,
    created_at
FROM queries";

const VERSE_SELECT_SQL: &str = "SELECT
    v.id,
    v.translation_id,
    v.book_id,
    v.chapter,
    v.verse,
    v.text
FROM verses v";

/// Repository interface for verses and queries.
pub trait VerseRepository {
    /// Cache lookup by natural key.
    fn find_query(&self, key: &QueryKey) -> RepoResult<Option<Query>>;
    fn get_query(&self, id: QueryId) -> RepoResult<Option<Query>>;
    /// Inserts the query, or returns the id of the row already holding `key`.
    fn create_query(&self, query: &NewQuery) -> RepoResult<QueryId>;
    /// Inserts the verse, or returns the id of the row already holding its
    /// natural key. Existing text is kept.
    fn upsert_verse(&self, verse: &NewVerse) -> RepoResult<VerseId>;
    /// Adds `verse_id` to `query_id` at `position`. Re-linking is a no-op.
    fn link_verse(&self, query_id: QueryId, verse_id: VerseId, position: u32) -> RepoResult<()>;
    fn query_verses(&self, query_id: QueryId) -> RepoResult<Vec<Verse>>;
    /// Case-insensitive substring search over verse text, insertion order.
    fn search(&self, term: &str, translation_id: Option<TranslationId>) -> RepoResult<Vec<Verse>>;
    fn list_queries(&self, translation_id: TranslationId) -> RepoResult<Vec<Query>>;
    /// Removes the query and its links. Verses stay.
    fn delete_query(&self, id: QueryId) -> RepoResult<()>;
}

/// SQLite-backed verse/query repository.
pub struct SqliteVerseRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteVerseRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables(conn, &["verses", "queries", "query_verses"])?;
        Ok(Self { conn })
    }

    fn find_query_id(&self, key: &QueryKey) -> RepoResult<Option<QueryId>> {
        let (verse_start, verse_end) = range_to_db(key.range);
        self.conn
            .query_row(
                "SELECT id FROM queries
                 WHERE translation_id = ?1
                   AND book_id = ?2
                   AND chapter = ?3
                   AND verse_start = ?4
                   AND verse_end = ?5;",
                params![
                    key.translation_id,
                    key.book_id.as_str(),
                    key.chapter,
                    verse_start,
                    verse_end
                ],
                |row| row.get("id"),
            )
            .optional()
            .map_err(RepoError::from)
    }

    fn find_verse_id(&self, verse: &NewVerse) -> RepoResult<Option<VerseId>> {
        self.conn
            .query_row(
                "SELECT id FROM verses
                 WHERE translation_id = ?1
                   AND book_id = ?2
                   AND chapter = ?3
                   AND verse = ?4;",
                params![
                    verse.translation_id,
                    verse.book_id.as_str(),
                    verse.chapter,
                    verse.verse
                ],
                |row| row.get("id"),
            )
            .optional()
            .map_err(RepoError::from)
    }

    fn collect_queries(&self, sql: &str, args: Vec<Value>) -> RepoResult<Vec<Query>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(args))?;
        let mut queries = Vec::new();
        while let Some(row) = rows.next()? {
            queries.push(parse_query_row(row)?);
        }
        Ok(queries)
    }

    fn collect_verses(&self, sql: &str, args: Vec<Value>) -> RepoResult<Vec<Verse>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(args), parse_verse_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(RepoError::from)
    }
}

impl VerseRepository for SqliteVerseRepository<'_> {
    fn find_query(&self, key: &QueryKey) -> RepoResult<Option<Query>> {
        match self.find_query_id(key)? {
            Some(id) => self.get_query(id),
            None => Ok(None),
        }
    }

    fn get_query(&self, id: QueryId) -> RepoResult<Option<Query>> {
        let mut queries = self.collect_queries(
            &format!("{QUERY_SELECT_SQL} WHERE id = ?1;"),
            vec![Value::Integer(id)],
        )?;
        Ok(queries.pop())
    }

    fn create_query(&self, query: &NewQuery) -> RepoResult<QueryId> {
        let key = &query.key;
        let (verse_start, verse_end) = range_to_db(key.range);

        for _ in 0..MAX_GET_OR_CREATE_ATTEMPTS {
            let inserted: Option<QueryId> = self
                .conn
                .query_row(
                    "INSERT INTO queries (
                        translation_id,
                        reference,
                        book_id,
                        chapter,
                        verse_start,
                        verse_end
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    ON CONFLICT(translation_id, book_id, chapter, verse_start, verse_end)
                    DO NOTHING
                    RETURNING id;",
                    params![
                        key.translation_id,
                        query.reference.as_str(),
                        key.book_id.as_str(),
                        key.chapter,
                        verse_start,
                        verse_end
                    ],
                    |row| row.get("id"),
                )
                .optional()?;
            if let Some(id) = inserted {
                return Ok(id);
            }
            if let Some(existing) = self.find_query_id(key)? {
                return Ok(existing);
            }
        }

        Err(RepoError::Contention {
            entity: "query",
            key: query.reference.clone(),
            attempts: MAX_GET_OR_CREATE_ATTEMPTS,
        })
    }

    fn upsert_verse(&self, verse: &NewVerse) -> RepoResult<VerseId> {
        for _ in 0..MAX_GET_OR_CREATE_ATTEMPTS {
            let inserted: Option<VerseId> = self
                .conn
                .query_row(
                    "INSERT INTO verses (translation_id, book_id, chapter, verse, text)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(translation_id, book_id, chapter, verse) DO NOTHING
                     RETURNING id;",
                    params![
                        verse.translation_id,
                        verse.book_id.as_str(),
                        verse.chapter,
                        verse.verse,
                        verse.text.as_str()
                    ],
                    |row| row.get("id"),
                )
                .optional()?;
            if let Some(id) = inserted {
                return Ok(id);
            }
            if let Some(existing) = self.find_verse_id(verse)? {
                return Ok(existing);
            }
        }

        Err(RepoError::Contention {
            entity: "verse",
            key: format!("{} {}:{}", verse.book_id, verse.chapter, verse.verse),
            attempts: MAX_GET_OR_CREATE_ATTEMPTS,
        })
    }

    fn link_verse(&self, query_id: QueryId, verse_id: VerseId, position: u32) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO query_verses (query_id, verse_id, position)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(query_id, verse_id) DO NOTHING;",
            params![query_id, verse_id, position],
        )?;
        Ok(())
    }

    fn query_verses(&self, query_id: QueryId) -> RepoResult<Vec<Verse>> {
        self.collect_verses(
            &format!(
                "{VERSE_SELECT_SQL}
                 INNER JOIN query_verses qv ON qv.verse_id = v.id
                 WHERE qv.query_id = ?1
                 ORDER BY qv.position ASC, v.id ASC;"
            ),
            vec![Value::Integer(query_id)],
        )
    }

    fn search(&self, term: &str, translation_id: Option<TranslationId>) -> RepoResult<Vec<Verse>> {
        let mut sql = format!("{VERSE_SELECT_SQL} WHERE instr(casefold(v.text), casefold(?)) > 0");
        let mut bind_values = vec![Value::Text(term.trim().to_string())];

        if let Some(translation_id) = translation_id {
            sql.push_str(" AND v.translation_id = ?");
            bind_values.push(Value::Integer(translation_id));
        }
        sql.push_str(" ORDER BY v.id ASC;");

        self.collect_verses(&sql, bind_values)
    }

    fn list_queries(&self, translation_id: TranslationId) -> RepoResult<Vec<Query>> {
        self.collect_queries(
            &format!("{QUERY_SELECT_SQL} WHERE translation_id = ?1 ORDER BY id ASC;"),
            vec![Value::Integer(translation_id)],
        )
    }

    fn delete_query(&self, id: QueryId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM queries WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::not_found("query", id));
        }
        Ok(())
    }
}

/// Maps a verse row selected with `VERSE_SELECT_SQL` columns.
pub(crate) fn parse_verse_row(row: &Row<'_>) -> rusqlite::Result<Verse> {
    Ok(Verse {
        id: row.get("id")?,
        translation_id: row.get("translation_id")?,
        book_id: row.get("book_id")?,
        chapter: row.get("chapter")?,
        verse: row.get("verse")?,
        text: row.get("text")?,
    })
}

fn parse_query_row(row: &Row<'_>) -> RepoResult<Query> {
    let verse_start: u32 = row.get("verse_start")?;
    let verse_end: u32 = row.get("verse_end")?;
    let range = range_from_db(verse_start, verse_end).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid verse range {verse_start}..{verse_end} in queries"
        ))
    })?;

    Ok(Query {
        id: row.get("id")?,
        translation_id: row.get("translation_id")?,
        reference: row.get("reference")?,
        book_id: row.get("book_id")?,
        chapter: row.get("chapter")?,
        range,
        created_at: row.get("created_at")?,
    })
}

fn range_to_db(range: VerseRange) -> (u32, u32) {
    match range {
        VerseRange::WholeChapter => (0, 0),
        VerseRange::Span { start, end } => (start, end),
    }
}

fn range_from_db(verse_start: u32, verse_end: u32) -> Option<VerseRange> {
    match (verse_start, verse_end) {
        (0, 0) => Some(VerseRange::WholeChapter),
        (0, _) => None,
        (start, end) if end >= start => Some(VerseRange::Span { start, end }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{range_from_db, range_to_db};
    use crate::model::reference::VerseRange;

    #[test]
    fn whole_chapter_is_stored_as_zero_zero() {
        assert_eq!(range_to_db(VerseRange::WholeChapter), (0, 0));
        assert_eq!(range_from_db(0, 0), Some(VerseRange::WholeChapter));
        assert_eq!(range_from_db(3, 5), Some(VerseRange::Span { start: 3, end: 5 }));
    }

    #[test]
    fn malformed_ranges_are_rejected() {
        assert_eq!(range_from_db(0, 4), None);
        assert_eq!(range_from_db(9, 2), None);
    }
}
