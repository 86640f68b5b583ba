//! Read-only access to canonical book reference data.

use crate::model::book::{Book, Testament};
use crate::model::reference::normalize_book_text;
use crate::repo::{ensure_tables, RepoError, RepoResult};
use rusqlite::{params_from_iter, Connection, Row};

const BOOK_SELECT_SQL: &str = "SELECT
    id,
    name,
    testament,
    position,
    chapters
FROM books";

/// Repository interface for book lookups.
pub trait BookRepository {
    fn get(&self, id: &str) -> RepoResult<Option<Book>>;
    /// Resolves free text (`john`, `JHN`, `1john`, `Gen`) to a book.
    fn find_by_name(&self, name: &str) -> RepoResult<Option<Book>>;
    /// All books in canonical order.
    fn list(&self) -> RepoResult<Vec<Book>>;
    /// Substring match on book name, canonical order.
    fn search(&self, term: &str) -> RepoResult<Vec<Book>>;
    fn count(&self) -> RepoResult<usize>;
}

pub struct SqliteBookRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteBookRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables(conn, &["books"])?;
        Ok(Self { conn })
    }

    fn query_books(&self, sql: &str, args: &[&str]) -> RepoResult<Vec<Book>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(args))?;
        let mut books = Vec::new();
        while let Some(row) = rows.next()? {
            books.push(parse_book_row(row)?);
        }
        Ok(books)
    }
}

impl BookRepository for SqliteBookRepository<'_> {
    fn get(&self, id: &str) -> RepoResult<Option<Book>> {
        let books = self.query_books(
            &format!("{BOOK_SELECT_SQL} WHERE id = ?1 COLLATE NOCASE;"),
            &[id.trim()],
        )?;
        Ok(books.into_iter().next())
    }

    fn find_by_name(&self, name: &str) -> RepoResult<Option<Book>> {
        let normalized = normalize_book_text(name);
        let compact: String = normalized.chars().filter(|ch| !ch.is_whitespace()).collect();
        if compact.is_empty() {
            return Ok(None);
        }

        let exact = self.query_books(
            &format!(
                "{BOOK_SELECT_SQL}
                 WHERE name = ?1 COLLATE NOCASE
                    OR replace(name, ' ', '') = ?2 COLLATE NOCASE
                    OR id = ?2 COLLATE NOCASE
                 ORDER BY position ASC
                 LIMIT 1;"
            ),
            &[normalized.as_str(), compact.as_str()],
        )?;
        if let Some(book) = exact.into_iter().next() {
            return Ok(Some(book));
        }

        // Abbreviations such as `Gen` or `Psalm` resolve only when unambiguous.
        let prefixed = self.query_books(
            &format!(
                "{BOOK_SELECT_SQL}
                 WHERE instr(casefold(replace(name, ' ', '')), casefold(?1)) = 1
                 ORDER BY position ASC
                 LIMIT 2;"
            ),
            &[compact.as_str()],
        )?;
        if prefixed.len() == 1 {
            return Ok(prefixed.into_iter().next());
        }
        Ok(None)
    }

    fn list(&self) -> RepoResult<Vec<Book>> {
        self.query_books(&format!("{BOOK_SELECT_SQL} ORDER BY position ASC;"), &[])
    }

    fn search(&self, term: &str) -> RepoResult<Vec<Book>> {
        self.query_books(
            &format!(
                "{BOOK_SELECT_SQL}
                 WHERE instr(casefold(name), casefold(?1)) > 0
                 ORDER BY position ASC;"
            ),
            &[term.trim()],
        )
    }

    fn count(&self) -> RepoResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM books;", [], |row| row.get(0))?;
        usize::try_from(count).map_err(|_| RepoError::InvalidData(format!("book count {count}")))
    }
}

fn parse_book_row(row: &Row<'_>) -> RepoResult<Book> {
    let testament_text: String = row.get("testament")?;
    let testament = Testament::parse(&testament_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid testament `{testament_text}` in books.testament"
        ))
    })?;

    Ok(Book {
        id: row.get("id")?,
        name: row.get("name")?,
        testament,
        position: row.get("position")?,
        chapters: row.get("chapters")?,
    })
}
