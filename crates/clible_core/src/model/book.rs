//! Canonical book reference data.

use serde::{Deserialize, Serialize};

/// USFM-style book code, e.g. `GEN` or `JHN`.
pub type BookId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Testament {
    #[serde(rename = "OT")]
    Old,
    #[serde(rename = "NT")]
    New,
}

impl Testament {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Old => "OT",
            Self::New => "NT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "OT" => Some(Self::Old),
            "NT" => Some(Self::New),
            _ => None,
        }
    }
}

/// Static book record. Read-only once seeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub name: String,
    pub testament: Testament,
    /// 1-based canonical position (Genesis = 1).
    pub position: u32,
    pub chapters: u32,
}

impl Book {
    pub fn has_chapter(&self, chapter: u32) -> bool {
        (1..=self.chapters).contains(&chapter)
    }
}
