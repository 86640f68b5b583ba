//! Persistence core for clible: cached passage retrieval and study sessions.
//! This crate is the single source of truth for storage invariants.

pub mod config;
pub mod db;
pub mod fetch;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, CoreConfig};
pub use db::{open_db, open_db_in_memory, with_db, DbError, DbResult, OpenOptions};
pub use fetch::{FetchError, InMemoryPassageSource, Passage, PassageSource, PassageVerse};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::reference::{Reference, ReferenceError, VerseRange};
pub use repo::{ConstraintKind, RepoError, RepoResult};
pub use service::session_service::{SessionService, SessionServiceError};
pub use service::verse_service::{
    FetchOrigin, QueryResult, VerseService, VerseServiceError, VerseServiceOptions,
};
pub use service::RequestContext;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
