//! Study session use-case service.
//!
//! # Responsibility
//! - Own the session lifecycle: `Active -> Saved`, and deletion from either.
//! - Enforce that only the owning user can see or change a session.
//!
//! # Invariants
//! - Missing sessions report `NotFound`; sessions owned by someone else
//!   report `Forbidden`. The two are never merged.
//! - Saving is one-way and idempotent.
//! - Deleting a session never deletes query rows.

use crate::model::session::{NewSession, Session, SessionId, SessionStatus};
use crate::model::verse::QueryId;
use crate::repo::session_repo::{SessionRepository, SessionVerse};
use crate::repo::RepoError;
use crate::service::RequestContext;
use log::info;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionServiceError {
    #[error("session not found: {0}")]
    NotFound(SessionId),
    #[error("session {session_id} does not belong to user {user_id}")]
    Forbidden {
        session_id: SessionId,
        user_id: String,
    },
    /// Session names must contain a non-whitespace character.
    #[error("invalid session name: `{0}`")]
    InvalidName(String),
    #[error("inconsistent session state: {0}")]
    InconsistentState(&'static str),
    #[error(transparent)]
    Repo(RepoError),
}

impl From<RepoError> for SessionServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound {
                entity: "session",
                id,
            } => match id.parse() {
                Ok(session_id) => Self::NotFound(session_id),
                Err(_) => Self::Repo(RepoError::NotFound {
                    entity: "session",
                    id,
                }),
            },
            other => Self::Repo(other),
        }
    }
}

/// Session service facade over repository implementations.
pub struct SessionService<R: SessionRepository> {
    repo: R,
}

impl<R: SessionRepository> SessionService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Starts a new active session owned by the caller.
    pub fn start(
        &self,
        ctx: &RequestContext,
        name: &str,
        scope: Option<&str>,
    ) -> Result<Session, SessionServiceError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(SessionServiceError::InvalidName(name.to_string()));
        }
        let scope = scope
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        let new_session = NewSession::new(ctx.user_id.clone(), trimmed, scope);
        let session_id = self.repo.create_session(&new_session)?;
        let session = self
            .repo
            .get_session(session_id)?
            .ok_or(SessionServiceError::InconsistentState(
                "created session not found in read-back",
            ))?;

        info!(
            "event=session_start module=service status=ok user_id={} session_id={}",
            ctx.user_id, session.id
        );
        Ok(session)
    }

    /// Returns an owned session.
    pub fn resume(
        &self,
        ctx: &RequestContext,
        session_id: SessionId,
    ) -> Result<Session, SessionServiceError> {
        let session = self.owned_session(ctx, session_id)?;
        info!(
            "event=session_resume module=service status=ok user_id={} session_id={} saved={}",
            ctx.user_id,
            session.id,
            session.status.is_saved()
        );
        Ok(session)
    }

    /// Marks an owned session saved. Saving a saved session is a no-op.
    pub fn save(
        &self,
        ctx: &RequestContext,
        session_id: SessionId,
    ) -> Result<Session, SessionServiceError> {
        let session = self.owned_session(ctx, session_id)?;
        if session.status.is_saved() {
            return Ok(session);
        }

        self.repo.mark_saved(session_id)?;
        let saved = self
            .repo
            .get_session(session_id)?
            .ok_or(SessionServiceError::InconsistentState(
                "saved session not found in read-back",
            ))?;
        if saved.status != SessionStatus::Saved {
            return Err(SessionServiceError::InconsistentState(
                "session not saved after save",
            ));
        }

        info!(
            "event=session_save module=service status=ok user_id={} session_id={}",
            ctx.user_id, session_id
        );
        Ok(saved)
    }

    /// Deletes an owned session and its query links.
    pub fn delete(
        &mut self,
        ctx: &RequestContext,
        session_id: SessionId,
    ) -> Result<(), SessionServiceError> {
        self.owned_session(ctx, session_id)?;
        let links = self.repo.delete_session(session_id, &ctx.user_id)?;
        info!(
            "event=session_delete module=service status=ok user_id={} session_id={} links={}",
            ctx.user_id, session_id, links
        );
        Ok(())
    }

    /// Caller's sessions in creation order.
    pub fn list_for_user(&self, ctx: &RequestContext) -> Result<Vec<Session>, SessionServiceError> {
        Ok(self.repo.list_sessions_for_user(&ctx.user_id)?)
    }

    /// Caller's sessions whose name or scope contains `term`.
    pub fn search_for_user(
        &self,
        ctx: &RequestContext,
        term: &str,
    ) -> Result<Vec<Session>, SessionServiceError> {
        Ok(self.repo.search_sessions_for_user(&ctx.user_id, term)?)
    }

    /// Links a stored query. Returns `false` when it was already linked.
    pub fn add_query(
        &self,
        ctx: &RequestContext,
        session_id: SessionId,
        query_id: QueryId,
    ) -> Result<bool, SessionServiceError> {
        self.owned_session(ctx, session_id)?;
        let added = self.repo.add_query(session_id, query_id)?;
        info!(
            "event=session_add_query module=service status=ok user_id={} session_id={} query_id={} added={}",
            ctx.user_id, session_id, query_id, added
        );
        Ok(added)
    }

    /// Unlinks a query. Returns `false` when it was not linked.
    pub fn remove_query(
        &self,
        ctx: &RequestContext,
        session_id: SessionId,
        query_id: QueryId,
    ) -> Result<bool, SessionServiceError> {
        self.owned_session(ctx, session_id)?;
        let removed = self.repo.remove_query(session_id, query_id)?;
        info!(
            "event=session_remove_query module=service status=ok user_id={} session_id={} query_id={} removed={}",
            ctx.user_id, session_id, query_id, removed
        );
        Ok(removed)
    }

    /// Query ids linked to an owned session, in add order.
    pub fn query_ids(
        &self,
        ctx: &RequestContext,
        session_id: SessionId,
    ) -> Result<Vec<QueryId>, SessionServiceError> {
        self.owned_session(ctx, session_id)?;
        Ok(self.repo.session_query_ids(session_id)?)
    }

    /// Verses of every query linked to an owned session.
    pub fn get_session_verses(
        &self,
        ctx: &RequestContext,
        session_id: SessionId,
    ) -> Result<Vec<SessionVerse>, SessionServiceError> {
        self.owned_session(ctx, session_id)?;
        Ok(self.repo.session_verses(session_id)?)
    }

    fn owned_session(
        &self,
        ctx: &RequestContext,
        session_id: SessionId,
    ) -> Result<Session, SessionServiceError> {
        let session = self
            .repo
            .get_session(session_id)?
            .ok_or(SessionServiceError::NotFound(session_id))?;
        if session.user_id != ctx.user_id {
            info!(
                "event=session_access module=service status=forbidden user_id={} session_id={}",
                ctx.user_id, session_id
            );
            return Err(SessionServiceError::Forbidden {
                session_id,
                user_id: ctx.user_id.clone(),
            });
        }
        Ok(session)
    }
}
