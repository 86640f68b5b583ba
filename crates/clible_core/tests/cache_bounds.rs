use clible_core::db::open_db_in_memory;
use clible_core::repo::bounds_repo::{BoundKey, BoundsRepository, SqliteBoundsRepository};
use clible_core::{
    ConstraintKind, InMemoryPassageSource, RepoError, RequestContext, VerseService,
    VerseServiceError, VerseServiceOptions,
};
use std::time::Duration;

#[test]
fn set_bound_overwrites_previous_value() {
    let conn = open_db_in_memory().unwrap();
    let bounds = SqliteBoundsRepository::try_new(&conn).unwrap();
    let key = BoundKey::chapter("PSA", 119, "KJV");

    assert_eq!(bounds.get_bound(&key).unwrap(), None);
    bounds.set_bound(&key, 170).unwrap();
    bounds.set_bound(&key, 176).unwrap();

    assert_eq!(bounds.get_bound(&key).unwrap(), Some(176));
    assert_eq!(
        bounds
            .get_bound(&BoundKey::chapter("PSA", 119, "kjv"))
            .unwrap(),
        Some(176)
    );
}

#[test]
fn book_and_chapter_bounds_are_independent() {
    let conn = open_db_in_memory().unwrap();
    let bounds = SqliteBoundsRepository::try_new(&conn).unwrap();
    let book = BoundKey::book("JHN", "kjv");
    let chapter_one = BoundKey::chapter("JHN", 1, "kjv");

    bounds.set_bound(&book, 21).unwrap();
    bounds.set_bound(&chapter_one, 51).unwrap();

    assert_eq!(bounds.get_bound(&book).unwrap(), Some(21));
    assert_eq!(bounds.get_bound(&chapter_one).unwrap(), Some(51));
    assert_eq!(bounds.get_bound(&BoundKey::book("JHN", "esv")).unwrap(), None);
}

#[test]
fn keys_accept_any_case_of_book_id() {
    let conn = open_db_in_memory().unwrap();
    let bounds = SqliteBoundsRepository::try_new(&conn).unwrap();

    bounds.set_bound(&BoundKey::book("gen", "web"), 50).unwrap();
    bounds.set_bound(&BoundKey::chapter(" Gen ", 1, "WEB"), 31).unwrap();

    assert_eq!(BoundKey::book("gen", "web").book_id, "GEN");
    assert_eq!(bounds.get_bound(&BoundKey::book("GEN", "web")).unwrap(), Some(50));
    assert_eq!(
        bounds.get_bound(&BoundKey::chapter("GEN", 1, "web")).unwrap(),
        Some(31)
    );
}

#[test]
fn clear_bound_reports_whether_a_row_existed() {
    let conn = open_db_in_memory().unwrap();
    let bounds = SqliteBoundsRepository::try_new(&conn).unwrap();
    let key = BoundKey::book("GEN", "kjv");
    bounds.set_bound(&key, 50).unwrap();

    assert!(bounds.clear_bound(&key).unwrap());
    assert!(!bounds.clear_bound(&key).unwrap());
    assert_eq!(bounds.get_bound(&key).unwrap(), None);
}

#[test]
fn bounds_reject_unknown_books_and_chapter_zero() {
    let conn = open_db_in_memory().unwrap();
    let bounds = SqliteBoundsRepository::try_new(&conn).unwrap();

    let err = bounds
        .set_bound(&BoundKey::book("XYZ", "kjv"), 3)
        .unwrap_err();
    assert!(err.is_constraint(ConstraintKind::ForeignKey));

    let err = bounds
        .set_bound(&BoundKey::chapter("GEN", 0, "kjv"), 3)
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(_)));
}

#[test]
fn book_level_bound_narrows_chapter_validation() {
    let mut conn = open_db_in_memory().unwrap();
    SqliteBoundsRepository::try_new(&conn)
        .unwrap()
        .set_bound(&BoundKey::book("JHN", "kjv"), 20)
        .unwrap();

    let source = InMemoryPassageSource::new().with_translation("KJV", "King James Version", "en");
    let options = VerseServiceOptions {
        request_delay: Duration::ZERO,
    };
    let mut service = VerseService::new(&mut conn, &source, options);
    match service.fetch_and_save(&RequestContext::new("reader"), "John 21:1", "KJV") {
        Err(VerseServiceError::ChapterOutOfRange { chapter, max, .. }) => {
            assert_eq!(chapter, 21);
            assert_eq!(max, 20);
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(source.total_calls(), 0);
}
