//! Verse and query records.
//!
//! # Invariants
//! - A verse is unique on `(translation_id, book_id, chapter, verse)`.
//! - A query is unique on `(translation_id, book_id, chapter, range)` and
//!   lists its verses in the order the source returned them.

use crate::model::book::BookId;
use crate::model::reference::VerseRange;
use crate::model::translation::TranslationId;
use serde::{Deserialize, Serialize};

pub type VerseId = i64;
pub type QueryId = i64;

/// Persisted verse row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verse {
    pub id: VerseId,
    pub translation_id: TranslationId,
    pub book_id: BookId,
    pub chapter: u32,
    pub verse: u32,
    pub text: String,
}

/// Persisted result of one fetch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub id: QueryId,
    pub translation_id: TranslationId,
    /// Canonical reference string, e.g. `John 3:16`.
    pub reference: String,
    pub book_id: BookId,
    pub chapter: u32,
    pub range: VerseRange,
    /// Epoch milliseconds.
    pub created_at: i64,
}

impl Query {
    pub fn key(&self) -> QueryKey {
        QueryKey {
            translation_id: self.translation_id,
            book_id: self.book_id.clone(),
            chapter: self.chapter,
            range: self.range,
        }
    }
}

/// Natural key used for cache lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub translation_id: TranslationId,
    pub book_id: BookId,
    pub chapter: u32,
    pub range: VerseRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuery {
    pub key: QueryKey,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVerse {
    pub translation_id: TranslationId,
    pub book_id: BookId,
    pub chapter: u32,
    pub verse: u32,
    pub text: String,
}
