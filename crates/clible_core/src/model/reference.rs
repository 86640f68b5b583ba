//! Passage reference parsing and rendering.
//!
//! # Responsibility
//! - Turn user input such as `John 3:16-18` into a structured reference.
//! - Render the canonical reference string stored on queries.
//!
//! # Invariants
//! - Chapter and verse numbers are 1-based.
//! - `VerseRange::Span` always satisfies `start <= end`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;

static REFERENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<book>(?:[1-3]\s*)?[A-Za-z][A-Za-z .']*?)\s*(?P<chapter>\d+)(?:\s*:\s*(?P<start>\d+)(?:\s*-\s*(?P<end>\d+))?)?$",
    )
    .expect("valid reference regex")
});
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Verses selected inside one chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerseRange {
    WholeChapter,
    Span { start: u32, end: u32 },
}

impl VerseRange {
    /// Single-verse span.
    pub fn single(verse: u32) -> Self {
        Self::Span {
            start: verse,
            end: verse,
        }
    }

    /// First requested verse, if the range is explicit.
    pub fn start(self) -> Option<u32> {
        match self {
            Self::WholeChapter => None,
            Self::Span { start, .. } => Some(start),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
    #[error("reference is empty")]
    Empty,
    #[error("cannot parse reference `{0}`")]
    Malformed(String),
    #[error("chapter and verse numbers start at 1 in `{0}`")]
    ZeroIndex(String),
    #[error("verse range ends before it starts in `{0}`")]
    ReversedRange(String),
}

/// Structured reference before book resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Book text as typed, whitespace-normalized (`1 John`, `Song of Solomon`).
    pub book: String,
    pub chapter: u32,
    pub range: VerseRange,
}

impl Reference {
    /// Parses `Book C`, `Book C:V` or `Book C:V-W`.
    pub fn parse(input: &str) -> Result<Self, ReferenceError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ReferenceError::Empty);
        }

        let caps = REFERENCE_RE
            .captures(trimmed)
            .ok_or_else(|| ReferenceError::Malformed(trimmed.to_string()))?;
        let number = |name: &str| -> Result<Option<u32>, ReferenceError> {
            caps.name(name)
                .map(|m| {
                    m.as_str()
                        .parse::<u32>()
                        .map_err(|_| ReferenceError::Malformed(trimmed.to_string()))
                })
                .transpose()
        };

        let chapter = number("chapter")?
            .ok_or_else(|| ReferenceError::Malformed(trimmed.to_string()))?;
        let start = number("start")?;
        let end = number("end")?;

        if chapter == 0 || start == Some(0) || end == Some(0) {
            return Err(ReferenceError::ZeroIndex(trimmed.to_string()));
        }

        let range = match (start, end) {
            (None, _) => VerseRange::WholeChapter,
            (Some(start), None) => VerseRange::single(start),
            (Some(start), Some(end)) if end < start => {
                return Err(ReferenceError::ReversedRange(trimmed.to_string()));
            }
            (Some(start), Some(end)) => VerseRange::Span { start, end },
        };

        Ok(Self {
            book: normalize_book_text(&caps["book"]),
            chapter,
            range,
        })
    }
}

impl Display for Reference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format_reference(&self.book, self.chapter, self.range))
    }
}

/// Renders `John 3`, `John 3:16` or `John 3:16-18`.
pub fn format_reference(book_name: &str, chapter: u32, range: VerseRange) -> String {
    match range {
        VerseRange::WholeChapter => format!("{book_name} {chapter}"),
        VerseRange::Span { start, end } if start == end => format!("{book_name} {chapter}:{start}"),
        VerseRange::Span { start, end } => format!("{book_name} {chapter}:{start}-{end}"),
    }
}

/// Collapses whitespace and inserts the space in numbered books (`1john`).
pub fn normalize_book_text(value: &str) -> String {
    let collapsed = WHITESPACE_RE.replace_all(value.trim(), " ");
    let mut chars = collapsed.chars();
    match (chars.next(), chars.next()) {
        (Some(digit @ '1'..='3'), Some(next)) if next.is_alphabetic() => {
            format!("{digit} {}", &collapsed[1..])
        }
        _ => collapsed.into_owned(),
    }
}
