//! Session repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist study sessions and their query membership.
//!
//! # Invariants
//! - `delete_session` removes link rows and the session row in one
//!   transaction; query rows are never touched.
//! - `is_saved` only moves `0 -> 1` (a trigger rejects the reverse).
//! - Sessions for one user list in insertion order.

use crate::model::session::{NewSession, Session, SessionId, SessionStatus};
use crate::model::verse::{QueryId, Verse};
use crate::repo::verse_repo::parse_verse_row;
use crate::repo::{ensure_tables, RepoError, RepoResult};
use rusqlite::{params, params_from_iter, Connection, Row, TransactionBehavior};
use serde::Serialize;
use uuid::Uuid;

const SESSION_SELECT_SQL: &str = "SELECT
    id,
    user_id,
    name,
    scope,
    is_saved,
    created_at
FROM sessions";

/// One verse reached through a session, tagged with the query it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionVerse {
    pub query_id: QueryId,
    pub reference: String,
    pub verse: Verse,
}

/// Repository interface for sessions.
pub trait SessionRepository {
    fn create_session(&self, session: &NewSession) -> RepoResult<SessionId>;
    fn get_session(&self, id: SessionId) -> RepoResult<Option<Session>>;
    fn list_sessions_for_user(&self, user_id: &str) -> RepoResult<Vec<Session>>;
    /// Substring match on session name or scope for one user.
    fn search_sessions_for_user(&self, user_id: &str, term: &str) -> RepoResult<Vec<Session>>;
    /// Sets the saved flag. Already-saved sessions are unchanged.
    fn mark_saved(&self, id: SessionId) -> RepoResult<()>;
    /// Deletes the session owned by `user_id` and its links, returning the
    /// number of links removed. `NotFound` when no such owned session exists.
    fn delete_session(&mut self, id: SessionId, user_id: &str) -> RepoResult<usize>;
    /// Links a query. Returns `false` when the link already existed.
    fn add_query(&self, session_id: SessionId, query_id: QueryId) -> RepoResult<bool>;
    /// Unlinks a query. Returns `false` when no link existed.
    fn remove_query(&self, session_id: SessionId, query_id: QueryId) -> RepoResult<bool>;
    /// Linked query ids in the order they were added.
    fn session_query_ids(&self, session_id: SessionId) -> RepoResult<Vec<QueryId>>;
    /// Verses of every linked query, grouped by query in add order.
    fn session_verses(&self, session_id: SessionId) -> RepoResult<Vec<SessionVerse>>;
}

/// SQLite-backed session repository.
pub struct SqliteSessionRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteSessionRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        ensure_tables(conn, &["sessions", "session_queries", "queries"])?;
        Ok(Self { conn })
    }

    fn collect_sessions(&self, sql: &str, args: &[&str]) -> RepoResult<Vec<Session>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(args))?;
        let mut sessions = Vec::new();
        while let Some(row) = rows.next()? {
            sessions.push(parse_session_row(row)?);
        }
        Ok(sessions)
    }
}

impl SessionRepository for SqliteSessionRepository<'_> {
    fn create_session(&self, session: &NewSession) -> RepoResult<SessionId> {
        self.conn.execute(
            "INSERT INTO sessions (id, user_id, name, scope)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                session.id.to_string(),
                session.user_id.as_str(),
                session.name.as_str(),
                session.scope.as_deref()
            ],
        )?;
        Ok(session.id)
    }

    fn get_session(&self, id: SessionId) -> RepoResult<Option<Session>> {
        let id_text = id.to_string();
        let sessions = self.collect_sessions(
            &format!("{SESSION_SELECT_SQL} WHERE id = ?1;"),
            &[id_text.as_str()],
        )?;
        Ok(sessions.into_iter().next())
    }

    fn list_sessions_for_user(&self, user_id: &str) -> RepoResult<Vec<Session>> {
        self.collect_sessions(
            &format!(
                "{SESSION_SELECT_SQL}
                 WHERE user_id = ?1
                 ORDER BY created_at ASC, rowid ASC;"
            ),
            &[user_id],
        )
    }

    fn search_sessions_for_user(&self, user_id: &str, term: &str) -> RepoResult<Vec<Session>> {
        self.collect_sessions(
            &format!(
                "{SESSION_SELECT_SQL}
                 WHERE user_id = ?1
                   AND (instr(casefold(name), casefold(?2)) > 0
                        OR instr(casefold(scope), casefold(?2)) > 0)
                 ORDER BY created_at ASC, rowid ASC;"
            ),
            &[user_id, term.trim()],
        )
    }

    fn mark_saved(&self, id: SessionId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE sessions SET is_saved = 1 WHERE id = ?1;",
            [id.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("session", id));
        }
        Ok(())
    }

    fn delete_session(&mut self, id: SessionId, user_id: &str) -> RepoResult<usize> {
        let id_text = id.to_string();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let owned: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM sessions WHERE id = ?1 AND user_id = ?2);",
            [id_text.as_str(), user_id],
            |row| row.get(0),
        )?;
        if !owned {
            return Err(RepoError::not_found("session", id));
        }

        let links = tx.execute(
            "DELETE FROM session_queries WHERE session_id = ?1;",
            [id_text.as_str()],
        )?;
        tx.execute(
            "DELETE FROM sessions WHERE id = ?1 AND user_id = ?2;",
            [id_text.as_str(), user_id],
        )?;

        tx.commit()?;
        Ok(links)
    }

    fn add_query(&self, session_id: SessionId, query_id: QueryId) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "INSERT INTO session_queries (session_id, query_id)
             VALUES (?1, ?2)
             ON CONFLICT(session_id, query_id) DO NOTHING;",
            params![session_id.to_string(), query_id],
        )?;
        Ok(changed == 1)
    }

    fn remove_query(&self, session_id: SessionId, query_id: QueryId) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM session_queries WHERE session_id = ?1 AND query_id = ?2;",
            params![session_id.to_string(), query_id],
        )?;
        Ok(changed == 1)
    }

    fn session_query_ids(&self, session_id: SessionId) -> RepoResult<Vec<QueryId>> {
        let mut stmt = self.conn.prepare(
            "SELECT query_id
             FROM session_queries
             WHERE session_id = ?1
             ORDER BY added_at ASC, rowid ASC;",
        )?;
        let rows = stmt.query_map([session_id.to_string()], |row| row.get("query_id"))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(RepoError::from)
    }

    fn session_verses(&self, session_id: SessionId) -> RepoResult<Vec<SessionVerse>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                v.id,
                v.translation_id,
                v.book_id,
                v.chapter,
                v.verse,
                v.text,
                q.id AS query_id,
                q.reference
             FROM session_queries sq
             INNER JOIN queries q ON q.id = sq.query_id
             INNER JOIN query_verses qv ON qv.query_id = q.id
             INNER JOIN verses v ON v.id = qv.verse_id
             WHERE sq.session_id = ?1
             ORDER BY sq.added_at ASC, sq.rowid ASC, qv.position ASC;",
        )?;
        let rows = stmt.query_map([session_id.to_string()], |row| {
            Ok(SessionVerse {
                query_id: row.get("query_id")?,
                reference: row.get("reference")?,
                verse: parse_verse_row(row)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(RepoError::from)
    }
}

fn parse_session_row(row: &Row<'_>) -> RepoResult<Session> {
    let id_text: String = row.get("id")?;
    let id = Uuid::parse_str(&id_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{id_text}` in sessions.id"))
    })?;
    let is_saved: i64 = row.get("is_saved")?;
    let status = match is_saved {
        0 => SessionStatus::Active,
        1 => SessionStatus::Saved,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid flag value `{other}` in sessions.is_saved"
            )))
        }
    };

    Ok(Session {
        id,
        user_id: row.get("user_id")?,
        name: row.get("name")?,
        scope: row.get("scope")?,
        status,
        created_at: row.get("created_at")?,
    })
}

