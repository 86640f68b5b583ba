//! Study session records.
//!
//! # Invariants
//! - A session has exactly one owner for its whole lifetime.
//! - `status` only moves `Active -> Saved`; deletion removes the record.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type SessionId = Uuid;

/// Opaque caller identity. The core never interprets it.
pub type UserId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Working collection, may be discarded.
    Active,
    /// Kept permanently by explicit save.
    Saved,
}

impl SessionStatus {
    pub fn is_saved(self) -> bool {
        matches!(self, Self::Saved)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub name: String,
    /// Free-form descriptor of what the session covers, e.g. `Gospel of John`.
    pub scope: Option<String>,
    pub status: SessionStatus,
    /// Epoch milliseconds, assigned by storage.
    pub created_at: i64,
}

/// Attributes for starting a session. Identity is generated up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub id: SessionId,
    pub user_id: UserId,
    pub name: String,
    pub scope: Option<String>,
}

impl NewSession {
    pub fn new(user_id: impl Into<UserId>, name: impl Into<String>, scope: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            name: name.into(),
            scope,
        }
    }
}
