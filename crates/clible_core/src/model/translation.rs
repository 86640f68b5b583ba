//! Translation records.
//!
//! # Invariants
//! - `abbreviation` is the natural key; it is compared case-insensitively
//!   and stored lowercase.
//! - Only `name` and `language` change after creation.

use serde::{Deserialize, Serialize};

pub type TranslationId = i64;

/// Persisted translation row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translation {
    pub id: TranslationId,
    pub abbreviation: String,
    pub name: String,
    /// BCP 47 style language code, e.g. `en`.
    pub language: String,
    /// Epoch milliseconds.
    pub created_at: i64,
}

/// Attributes for creating a translation on first reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTranslation {
    pub abbreviation: String,
    pub name: String,
    pub language: String,
}

impl NewTranslation {
    pub fn new(
        abbreviation: impl AsRef<str>,
        name: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            abbreviation: normalize_abbreviation(abbreviation.as_ref()),
            name: name.into(),
            language: language.into(),
        }
    }
}

/// Normalizes a translation code to its stored form.
pub fn normalize_abbreviation(value: &str) -> String {
    value.trim().to_lowercase()
}
