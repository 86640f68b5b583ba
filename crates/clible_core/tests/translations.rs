use clible_core::db::{open_db, open_db_in_memory, OpenOptions};
use clible_core::model::translation::NewTranslation;
use clible_core::model::verse::{NewQuery, NewVerse, QueryKey};
use clible_core::repo::translation_repo::{SqliteTranslationRepository, TranslationRepository};
use clible_core::repo::verse_repo::{SqliteVerseRepository, VerseRepository};
use clible_core::{RepoError, VerseRange};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn get_or_create_returns_same_id_for_any_case() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTranslationRepository::try_new(&conn).unwrap();

    let first = repo
        .get_or_create(&NewTranslation::new("KJV", "King James Version", "en"))
        .unwrap();
    let second = repo
        .get_or_create(&NewTranslation::new(" kjv ", "ignored", "xx"))
        .unwrap();

    assert_eq!(first, second);
    let stored = repo.get(first).unwrap().unwrap();
    assert_eq!(stored.abbreviation, "kjv");
    assert_eq!(stored.name, "King James Version");
    assert_eq!(stored.language, "en");
    assert_eq!(repo.list().unwrap().len(), 1);
}

#[test]
fn find_by_abbreviation_ignores_case() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTranslationRepository::try_new(&conn).unwrap();
    let id = repo
        .get_or_create(&NewTranslation::new("web", "World English Bible", "en"))
        .unwrap();

    assert_eq!(repo.find_by_abbreviation("WEB").unwrap().unwrap().id, id);
    assert!(repo.find_by_abbreviation("esv").unwrap().is_none());
}

#[test]
fn search_matches_abbreviation_or_name_in_insertion_order() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTranslationRepository::try_new(&conn).unwrap();
    repo.get_or_create(&NewTranslation::new("kjv", "King James Version", "en"))
        .unwrap();
    repo.get_or_create(&NewTranslation::new("web", "World English Bible", "en"))
        .unwrap();
    repo.get_or_create(&NewTranslation::new("nkjv", "New King James Version", "en"))
        .unwrap();

    let found: Vec<String> = repo
        .search("KJV")
        .unwrap()
        .into_iter()
        .map(|t| t.abbreviation)
        .collect();
    assert_eq!(found, vec!["kjv", "nkjv"]);

    let by_name: Vec<String> = repo
        .search("english")
        .unwrap()
        .into_iter()
        .map(|t| t.abbreviation)
        .collect();
    assert_eq!(by_name, vec!["web"]);
    assert!(repo.search("100%").unwrap().is_empty());
}

#[test]
fn update_metadata_changes_only_name_and_language() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTranslationRepository::try_new(&conn).unwrap();
    let id = repo
        .get_or_create(&NewTranslation::new("kjv", "kjv", "en"))
        .unwrap();
    let before = repo.get(id).unwrap().unwrap();

    repo.update_metadata(id, "King James Version", "en-GB").unwrap();

    let after = repo.get(id).unwrap().unwrap();
    assert_eq!(after.name, "King James Version");
    assert_eq!(after.language, "en-GB");
    assert_eq!(after.abbreviation, before.abbreviation);
    assert_eq!(after.created_at, before.created_at);

    let err = repo.update_metadata(id + 100, "x", "y").unwrap_err();
    assert!(matches!(err, RepoError::NotFound { entity: "translation", .. }));
}

#[test]
fn delete_cascades_verses_and_queries() {
    let conn = open_db_in_memory().unwrap();
    let translations = SqliteTranslationRepository::try_new(&conn).unwrap();
    let verses = SqliteVerseRepository::try_new(&conn).unwrap();
    let id = translations
        .get_or_create(&NewTranslation::new("kjv", "King James Version", "en"))
        .unwrap();
    let key = QueryKey {
        translation_id: id,
        book_id: "JHN".to_string(),
        chapter: 3,
        range: VerseRange::single(16),
    };
    let query_id = verses
        .create_query(&NewQuery {
            key: key.clone(),
            reference: "John 3:16".to_string(),
        })
        .unwrap();
    let verse_id = verses
        .upsert_verse(&NewVerse {
            translation_id: id,
            book_id: "JHN".to_string(),
            chapter: 3,
            verse: 16,
            text: "For God so loved the world".to_string(),
        })
        .unwrap();
    verses.link_verse(query_id, verse_id, 0).unwrap();

    translations.delete(id).unwrap();

    assert!(translations.get(id).unwrap().is_none());
    assert!(verses.find_query(&key).unwrap().is_none());
    assert!(verses.search("loved", None).unwrap().is_empty());
    assert!(matches!(
        translations.delete(id),
        Err(RepoError::NotFound { .. })
    ));
}

#[test]
fn concurrent_get_or_create_settles_on_one_row() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("race.db");
    drop(open_db(&path, &OpenOptions::default()).unwrap());

    const WORKERS: usize = 8;
    let barrier = Arc::new(Barrier::new(WORKERS));
    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            let path = path.clone();
            thread::spawn(move || {
                let conn = open_db(&path, &OpenOptions::default()).unwrap();
                let repo = SqliteTranslationRepository::try_new(&conn).unwrap();
                barrier.wait();
                repo.get_or_create(&NewTranslation::new("ESV", "English Standard Version", "en"))
                    .unwrap()
            })
        })
        .collect();

    let ids: Vec<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));

    let conn = open_db(&path, &OpenOptions::default()).unwrap();
    let rows: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM translations WHERE abbreviation = 'esv';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(rows, 1);
}
