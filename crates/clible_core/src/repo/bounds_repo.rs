//! Cache bounds: known chapter counts per book and verse counts per chapter,
//! as observed from the remote source for one translation.
//!
//! A key without a chapter addresses the book-level bound (highest chapter);
//! a key with a chapter addresses that chapter's highest verse.

use crate::model::book::BookId;
use crate::model::translation::normalize_abbreviation;
use crate::repo::{ensure_tables, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension};

/// Stored as `chapter = 0`.
const BOOK_LEVEL_CHAPTER: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoundKey {
    pub book_id: BookId,
    pub chapter: Option<u32>,
    pub translation: String,
}

impl BoundKey {
    /// Highest chapter of `book_id` known for `translation`.
    pub fn book(book_id: impl Into<BookId>, translation: &str) -> Self {
        Self {
            book_id: normalize_book_id(book_id.into()),
            chapter: None,
            translation: normalize_abbreviation(translation),
        }
    }

    /// Highest verse of `chapter` known for `translation`.
    pub fn chapter(book_id: impl Into<BookId>, chapter: u32, translation: &str) -> Self {
        Self {
            book_id: normalize_book_id(book_id.into()),
            chapter: Some(chapter),
            translation: normalize_abbreviation(translation),
        }
    }

    fn chapter_column(&self) -> u32 {
        self.chapter.unwrap_or(BOOK_LEVEL_CHAPTER)
    }
}

/// Book ids are stored as uppercase USFM codes.
fn normalize_book_id(book_id: BookId) -> BookId {
    book_id.trim().to_ascii_uppercase()
}

pub trait BoundsRepository {
    /// Inserts or replaces the bound for `key`.
    fn set_bound(&self, key: &BoundKey, bound: u32) -> RepoResult<()>;
    fn get_bound(&self, key: &BoundKey) -> RepoResult<Option<u32>>;
    /// Removes the bound. Returns `false` when none was recorded.
    fn clear_bound(&self, key: &BoundKey) -> RepoResult<bool>;
}

pub struct SqliteBoundsRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteBoundsRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables(conn, &["cache_bounds"])?;
        Ok(Self { conn })
    }
}

impl BoundsRepository for SqliteBoundsRepository<'_> {
    fn set_bound(&self, key: &BoundKey, bound: u32) -> RepoResult<()> {
        if key.chapter == Some(BOOK_LEVEL_CHAPTER) {
            return Err(RepoError::InvalidData(format!(
                "chapter 0 is not addressable for {} bounds",
                key.book_id
            )));
        }
        self.conn.execute(
            "INSERT INTO cache_bounds (book_id, chapter, translation, bound)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(book_id, chapter, translation) DO UPDATE SET
                bound = excluded.bound,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                key.book_id.as_str(),
                key.chapter_column(),
                key.translation.as_str(),
                bound
            ],
        )?;
        Ok(())
    }

    fn get_bound(&self, key: &BoundKey) -> RepoResult<Option<u32>> {
        self.conn
            .query_row(
                "SELECT bound
                 FROM cache_bounds
                 WHERE book_id = ?1 AND chapter = ?2 AND translation = ?3;",
                params![
                    key.book_id.as_str(),
                    key.chapter_column(),
                    key.translation.as_str()
                ],
                |row| row.get("bound"),
            )
            .optional()
            .map_err(RepoError::from)
    }

    fn clear_bound(&self, key: &BoundKey) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM cache_bounds
             WHERE book_id = ?1 AND chapter = ?2 AND translation = ?3;",
            params![
                key.book_id.as_str(),
                key.chapter_column(),
                key.translation.as_str()
            ],
        )?;
        Ok(changed == 1)
    }
}
