use clible_core::db::open_db_in_memory;
use clible_core::model::session::SessionStatus;
use clible_core::model::verse::QueryId;
use clible_core::model::session::NewSession;
use clible_core::repo::session_repo::{SessionRepository, SqliteSessionRepository};
use clible_core::{
    ConstraintKind, InMemoryPassageSource, PassageVerse, RepoError, RequestContext,
    SessionService, SessionServiceError, VerseService, VerseServiceOptions,
};
use rusqlite::Connection;
use std::time::Duration;
use uuid::Uuid;

fn alice() -> RequestContext {
    RequestContext::new("alice")
}

fn bob() -> RequestContext {
    RequestContext::new("bob")
}

fn verse(chapter: u32, number: u32, text: &str) -> PassageVerse {
    PassageVerse {
        book_id: "ROM".to_string(),
        book_name: "Romans".to_string(),
        chapter,
        verse: number,
        text: text.to_string(),
    }
}

/// Stores `Romans 8:28` and `Romans 12:1-2`, returning their query ids.
fn stored_queries(conn: &mut Connection) -> (QueryId, QueryId) {
    let source = InMemoryPassageSource::new()
        .with_translation("KJV", "King James Version", "en")
        .with_verse("KJV", verse(8, 28, "all things work together for good"))
        .with_verse("KJV", verse(12, 1, "present your bodies a living sacrifice"))
        .with_verse("KJV", verse(12, 2, "be not conformed to this world"));
    let options = VerseServiceOptions {
        request_delay: Duration::ZERO,
    };
    let mut service = VerseService::new(conn, &source, options);
    let first = service
        .fetch_and_save(&alice(), "Romans 8:28", "KJV")
        .unwrap();
    let second = service
        .fetch_and_save(&alice(), "Romans 12:1-2", "KJV")
        .unwrap();
    (first.query.id, second.query.id)
}

fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
        row.get(0)
    })
    .unwrap()
}

#[test]
fn start_resume_and_list_are_scoped_to_the_owner() {
    let mut conn = open_db_in_memory().unwrap();
    let repo = SqliteSessionRepository::try_new(&mut conn).unwrap();
    let service = SessionService::new(repo);

    let first = service
        .start(&alice(), "  Gospel study ", Some("Gospel of John"))
        .unwrap();
    let second = service.start(&alice(), "Psalms", Some("  ")).unwrap();
    service.start(&bob(), "Bob's notes", None).unwrap();

    assert_eq!(first.name, "Gospel study");
    assert_eq!(first.scope.as_deref(), Some("Gospel of John"));
    assert_eq!(first.status, SessionStatus::Active);
    assert_eq!(second.scope, None);

    let listed: Vec<Uuid> = service
        .list_for_user(&alice())
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(listed, vec![first.id, second.id]);

    assert_eq!(service.resume(&alice(), first.id).unwrap(), first);
}

#[test]
fn foreign_and_missing_sessions_are_distinguished() {
    let mut conn = open_db_in_memory().unwrap();
    let service = SessionService::new(SqliteSessionRepository::try_new(&mut conn).unwrap());
    let session = service.start(&alice(), "Romans", None).unwrap();

    match service.resume(&bob(), session.id) {
        Err(SessionServiceError::Forbidden {
            session_id,
            user_id,
        }) => {
            assert_eq!(session_id, session.id);
            assert_eq!(user_id, "bob");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(matches!(
        service.save(&bob(), session.id),
        Err(SessionServiceError::Forbidden { .. })
    ));

    let missing = Uuid::new_v4();
    assert!(matches!(
        service.resume(&alice(), missing),
        Err(SessionServiceError::NotFound(id)) if id == missing
    ));
}

#[test]
fn blank_names_are_rejected() {
    let mut conn = open_db_in_memory().unwrap();
    let service = SessionService::new(SqliteSessionRepository::try_new(&mut conn).unwrap());

    assert!(matches!(
        service.start(&alice(), "   ", None),
        Err(SessionServiceError::InvalidName(_))
    ));
    assert!(service.list_for_user(&alice()).unwrap().is_empty());
}

#[test]
fn save_is_one_way_and_idempotent() {
    let mut conn = open_db_in_memory().unwrap();
    let session_id = {
        let service = SessionService::new(SqliteSessionRepository::try_new(&mut conn).unwrap());
        let session = service.start(&alice(), "Keepers", None).unwrap();

        let saved = service.save(&alice(), session.id).unwrap();
        assert_eq!(saved.status, SessionStatus::Saved);
        assert_eq!(service.save(&alice(), session.id).unwrap(), saved);
        session.id
    };

    let err = conn
        .execute(
            "UPDATE sessions SET is_saved = 0 WHERE id = ?1;",
            [session_id.to_string()],
        )
        .map_err(RepoError::from)
        .unwrap_err();
    assert!(err.is_constraint(ConstraintKind::Trigger));
}

#[test]
fn add_query_is_idempotent_and_requires_an_existing_query() {
    let mut conn = open_db_in_memory().unwrap();
    let (romans_8, romans_12) = stored_queries(&mut conn);
    let service = SessionService::new(SqliteSessionRepository::try_new(&mut conn).unwrap());
    let session = service.start(&alice(), "Romans", None).unwrap();

    assert!(service.add_query(&alice(), session.id, romans_12).unwrap());
    assert!(service.add_query(&alice(), session.id, romans_8).unwrap());
    assert!(!service.add_query(&alice(), session.id, romans_12).unwrap());
    assert_eq!(
        service.query_ids(&alice(), session.id).unwrap(),
        vec![romans_12, romans_8]
    );

    match service.add_query(&alice(), session.id, romans_12 + 1000) {
        Err(SessionServiceError::Repo(err)) => {
            assert!(err.is_constraint(ConstraintKind::ForeignKey))
        }
        other => panic!("unexpected result: {other:?}"),
    }

    assert!(service.remove_query(&alice(), session.id, romans_8).unwrap());
    assert!(!service.remove_query(&alice(), session.id, romans_8).unwrap());
    assert_eq!(
        service.query_ids(&alice(), session.id).unwrap(),
        vec![romans_12]
    );
}

#[test]
fn session_verses_follow_add_order_then_verse_order() {
    let mut conn = open_db_in_memory().unwrap();
    let (romans_8, romans_12) = stored_queries(&mut conn);
    let service = SessionService::new(SqliteSessionRepository::try_new(&mut conn).unwrap());
    let session = service.start(&alice(), "Romans", None).unwrap();
    service.add_query(&alice(), session.id, romans_12).unwrap();
    service.add_query(&alice(), session.id, romans_8).unwrap();

    let verses = service.get_session_verses(&alice(), session.id).unwrap();
    let labels: Vec<(String, u32)> = verses
        .iter()
        .map(|v| (v.reference.clone(), v.verse.verse))
        .collect();
    assert_eq!(
        labels,
        vec![
            ("Romans 12:1-2".to_string(), 1),
            ("Romans 12:1-2".to_string(), 2),
            ("Romans 8:28".to_string(), 28),
        ]
    );
    assert!(matches!(
        service.get_session_verses(&bob(), session.id),
        Err(SessionServiceError::Forbidden { .. })
    ));
}

#[test]
fn delete_removes_links_but_keeps_queries() {
    let mut conn = open_db_in_memory().unwrap();
    let (romans_8, romans_12) = stored_queries(&mut conn);
    {
        let mut service =
            SessionService::new(SqliteSessionRepository::try_new(&mut conn).unwrap());
        let doomed = service.start(&alice(), "Scratch", None).unwrap();
        let kept = service.start(&alice(), "Kept", None).unwrap();
        service.add_query(&alice(), doomed.id, romans_8).unwrap();
        service.add_query(&alice(), doomed.id, romans_12).unwrap();
        service.add_query(&alice(), kept.id, romans_8).unwrap();

        assert!(matches!(
            service.delete(&bob(), doomed.id),
            Err(SessionServiceError::Forbidden { .. })
        ));
        service.delete(&alice(), doomed.id).unwrap();

        assert!(matches!(
            service.resume(&alice(), doomed.id),
            Err(SessionServiceError::NotFound(_))
        ));
        assert!(matches!(
            service.delete(&alice(), doomed.id),
            Err(SessionServiceError::NotFound(_))
        ));
        assert_eq!(
            service.query_ids(&alice(), kept.id).unwrap(),
            vec![romans_8]
        );
    }

    assert_eq!(count(&conn, "sessions"), 1);
    assert_eq!(count(&conn, "session_queries"), 1);
    assert_eq!(count(&conn, "queries"), 2);
}

#[test]
fn saved_sessions_can_still_be_deleted() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = SessionService::new(SqliteSessionRepository::try_new(&mut conn).unwrap());
    let session = service.start(&alice(), "Archive", None).unwrap();
    service.save(&alice(), session.id).unwrap();

    service.delete(&alice(), session.id).unwrap();
    assert!(service.list_for_user(&alice()).unwrap().is_empty());
}

#[test]
fn search_matches_name_or_scope_for_owner_only() {
    let mut conn = open_db_in_memory().unwrap();
    let service = SessionService::new(SqliteSessionRepository::try_new(&mut conn).unwrap());
    let gospel = service
        .start(&alice(), "Morning reading", Some("Gospel of John"))
        .unwrap();
    let psalms = service.start(&alice(), "Psalms of ascent", None).unwrap();
    service.start(&bob(), "Gospel harmony", None).unwrap();

    let found: Vec<Uuid> = service
        .search_for_user(&alice(), "gospel")
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(found, vec![gospel.id]);

    let found: Vec<Uuid> = service
        .search_for_user(&alice(), "PSALMS")
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(found, vec![psalms.id]);
}

#[test]
fn search_folds_non_ascii_case() {
    let mut conn = open_db_in_memory().unwrap();
    let service = SessionService::new(SqliteSessionRepository::try_new(&mut conn).unwrap());
    let evening = service
        .start(&alice(), "Abendandacht", Some("ÜBER die Gnade"))
        .unwrap();
    service.start(&alice(), "Morgenlob", None).unwrap();

    let found: Vec<Uuid> = service
        .search_for_user(&alice(), "über")
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(found, vec![evening.id]);
}

#[test]
fn repository_delete_requires_the_owner() {
    let mut conn = open_db_in_memory().unwrap();
    let (romans_8, _) = stored_queries(&mut conn);
    let mut repo = SqliteSessionRepository::try_new(&mut conn).unwrap();
    let session = NewSession::new("alice", "Romans", None);
    let id = repo.create_session(&session).unwrap();
    repo.add_query(id, romans_8).unwrap();

    match repo.delete_session(id, "bob") {
        Err(RepoError::NotFound { entity, .. }) => assert_eq!(entity, "session"),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(repo.get_session(id).unwrap().is_some());
    assert_eq!(repo.session_query_ids(id).unwrap(), vec![romans_8]);

    assert_eq!(repo.delete_session(id, "alice").unwrap(), 1);
    assert!(repo.get_session(id).unwrap().is_none());
}
