//! Remote passage source abstraction.
//!
//! # Responsibility
//! - Describe the external collaborator that returns passages on cache miss.
//! - Normalize remote payloads into one passage shape.
//!
//! # Invariants
//! - Implementations enforce their own request timeout and report it as
//!   `FetchError::Timeout`.
//! - `Passage::verses` lists verses in source order.

use crate::model::book::{Book, BookId};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::time::Duration;
use thiserror::Error;

pub mod memory;

pub use memory::InMemoryPassageSource;

pub type FetchResult<T> = Result<T, FetchError>;

/// Failure reported by a passage source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The source has no such translation or passage.
    #[error("not found: {0}")]
    NotFound(String),
    #[error("request timed out after {}ms", after.as_millis())]
    Timeout { after: Duration },
    #[error("fetch failed: {0}")]
    Generic(String),
}

/// Translation metadata as reported by the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationInfo {
    pub abbreviation: String,
    pub name: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassageVerse {
    pub book_id: BookId,
    pub book_name: String,
    pub chapter: u32,
    pub verse: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub translation: TranslationInfo,
    /// Reference as rendered by the source.
    pub reference: String,
    pub verses: Vec<PassageVerse>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteBook {
    pub id: BookId,
    pub name: String,
}

/// Synchronous remote collaborator consulted on cache miss.
pub trait PassageSource {
    /// Verses `verses` of `book` `chapter`.
    fn fetch_passage(
        &self,
        translation: &str,
        book: &Book,
        chapter: u32,
        verses: RangeInclusive<u32>,
    ) -> FetchResult<Passage>;

    /// Every verse of `book` `chapter`.
    fn fetch_chapter(&self, translation: &str, book: &Book, chapter: u32)
        -> FetchResult<Passage>;

    /// One verse chosen by the source.
    fn fetch_random(&self, translation: &str) -> FetchResult<Passage>;

    fn list_books(&self) -> FetchResult<Vec<RemoteBook>>;
}

impl<T: PassageSource + ?Sized> PassageSource for &T {
    fn fetch_passage(
        &self,
        translation: &str,
        book: &Book,
        chapter: u32,
        verses: RangeInclusive<u32>,
    ) -> FetchResult<Passage> {
        (**self).fetch_passage(translation, book, chapter, verses)
    }

    fn fetch_chapter(
        &self,
        translation: &str,
        book: &Book,
        chapter: u32,
    ) -> FetchResult<Passage> {
        (**self).fetch_chapter(translation, book, chapter)
    }

    fn fetch_random(&self, translation: &str) -> FetchResult<Passage> {
        (**self).fetch_random(translation)
    }

    fn list_books(&self) -> FetchResult<Vec<RemoteBook>> {
        (**self).list_books()
    }
}

#[cfg(test)]
mod tests {
    use super::FetchError;
    use std::time::Duration;

    #[test]
    fn fetch_error_display() {
        assert_eq!(
            FetchError::NotFound("John 99".to_string()).to_string(),
            "not found: John 99"
        );
        assert_eq!(
            FetchError::Timeout {
                after: Duration::from_secs(10)
            }
            .to_string(),
            "request timed out after 10000ms"
        );
    }
}
