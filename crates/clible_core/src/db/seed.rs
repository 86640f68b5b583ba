//! Canonical book seed data.
//!
//! # Invariants
//! - Seeding only runs against an empty `books` table.
//! - All 66 rows are inserted in one transaction or none are.

use super::DbResult;
use crate::model::book::Book;
use log::info;
use rusqlite::{params, Connection, TransactionBehavior};
use serde::Deserialize;

const BOOKS_JSON: &str = include_str!("books.json");

#[derive(Deserialize)]
struct BookCatalog {
    books: Vec<Book>,
}

/// Returns the bundled canonical book list in canonical order.
pub fn bundled_books() -> DbResult<Vec<Book>> {
    let catalog: BookCatalog = serde_json::from_str(BOOKS_JSON)?;
    Ok(catalog.books)
}

/// Populates `books` from bundled data when the table is empty.
///
/// The emptiness check and the inserts share one IMMEDIATE transaction, so
/// concurrent openers seed at most once.
/// Returns the number of inserted rows, `0` when books already exist.
pub fn seed_books_if_empty(conn: &mut Connection) -> DbResult<usize> {
    let books = bundled_books()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let existing: i64 = tx.query_row("SELECT COUNT(*) FROM books;", [], |row| row.get(0))?;
    if existing > 0 {
        return Ok(0);
    }

    {
        let mut stmt = tx.prepare(
            "INSERT INTO books (id, name, testament, position, chapters)
             VALUES (?1, ?2, ?3, ?4, ?5);",
        )?;
        for book in &books {
            stmt.execute(params![
                book.id.as_str(),
                book.name.as_str(),
                book.testament.as_str(),
                book.position,
                book.chapters,
            ])?;
        }
    }
    tx.commit()?;

    info!("event=db_seed module=db status=ok books={}", books.len());
    Ok(books.len())
}
