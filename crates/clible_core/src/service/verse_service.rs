//! Cache-aside passage retrieval.
//!
//! # Responsibility
//! - Resolve a textual reference to a stored query, fetching and persisting
//!   it from the passage source on cache miss.
//!
//! # Invariants
//! - A cache hit makes zero source calls.
//! - A miss makes exactly one source call, then persists the translation,
//!   query, verses and links in one IMMEDIATE transaction.
//! - A failed or empty fetch writes nothing.
//! - Consecutive source calls are spaced by at least `request_delay`.

use crate::fetch::{FetchError, Passage, PassageSource};
use crate::model::book::Book;
use crate::model::reference::{format_reference, Reference, ReferenceError, VerseRange};
use crate::model::translation::{NewTranslation, Translation, TranslationId};
use crate::model::verse::{NewQuery, NewVerse, Query, QueryKey, Verse};
use crate::repo::book_repo::{BookRepository, SqliteBookRepository};
use crate::repo::bounds_repo::{BoundKey, BoundsRepository, SqliteBoundsRepository};
use crate::repo::translation_repo::{SqliteTranslationRepository, TranslationRepository};
use crate::repo::verse_repo::{SqliteVerseRepository, VerseRepository};
use crate::repo::RepoError;
use crate::service::RequestContext;
use log::{debug, info, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VerseServiceError {
    #[error("invalid reference: {0}")]
    InvalidReference(#[from] ReferenceError),
    #[error("unknown book `{0}`")]
    UnknownBook(String),
    #[error("{book} has {max} chapters; chapter {chapter} requested")]
    ChapterOutOfRange { book: String, chapter: u32, max: u32 },
    #[error("{book} {chapter} has {max} verses; verse {verse} requested")]
    VerseOutOfRange {
        book: String,
        chapter: u32,
        verse: u32,
        max: u32,
    },
    #[error("source returned no verses for {0}")]
    EmptyPassage(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("failed to persist {reference}: {source}")]
    Persist {
        reference: String,
        #[source]
        source: RepoError,
    },
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("inconsistent verse state: {0}")]
    InconsistentState(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerseServiceOptions {
    /// Minimum spacing between consecutive source calls.
    pub request_delay: Duration,
}

impl Default for VerseServiceOptions {
    fn default() -> Self {
        Self {
            request_delay: Duration::from_secs(1),
        }
    }
}

/// Where the rows of a `QueryResult` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchOrigin {
    Cache,
    Remote,
}

impl FetchOrigin {
    fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Remote => "remote",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    pub query: Query,
    pub translation: Translation,
    pub book: Book,
    /// Verses in source order.
    pub verses: Vec<Verse>,
    pub origin: FetchOrigin,
}

/// Resolved and validated request.
struct Target {
    book: Book,
    chapter: u32,
    range: VerseRange,
    reference: String,
}

/// Cache-aside orchestrator over one connection and one passage source.
pub struct VerseService<'conn, S: PassageSource> {
    conn: &'conn mut Connection,
    source: S,
    options: VerseServiceOptions,
    last_fetch_at: Option<Instant>,
}

impl<'conn, S: PassageSource> VerseService<'conn, S> {
    pub fn new(conn: &'conn mut Connection, source: S, options: VerseServiceOptions) -> Self {
        Self {
            conn,
            source,
            options,
            last_fetch_at: None,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Returns the stored query for `reference`, fetching it on miss.
    pub fn fetch_and_save(
        &mut self,
        ctx: &RequestContext,
        reference: &str,
        translation: &str,
    ) -> Result<QueryResult, VerseServiceError> {
        let started_at = Instant::now();
        let target = self.resolve(reference, translation)?;

        if let Some(hit) = self.find_cached(translation, &target)? {
            log_result(ctx, &hit, translation, started_at);
            return Ok(hit);
        }

        self.wait_for_request_slot();
        let fetched = match target.range {
            VerseRange::WholeChapter => {
                self.source
                    .fetch_chapter(translation, &target.book, target.chapter)
            }
            VerseRange::Span { start, end } => self.source.fetch_passage(
                translation,
                &target.book,
                target.chapter,
                start..=end,
            ),
        };
        self.last_fetch_at = Some(Instant::now());
        let passage = fetched.map_err(|err| log_fetch_failure(ctx, &target.reference, err))?;

        let result = self.store(translation, target, passage)?;
        log_result(ctx, &result, translation, started_at);
        Ok(result)
    }

    /// Cache-only lookup; never calls the source.
    pub fn lookup(
        &self,
        ctx: &RequestContext,
        reference: &str,
        translation: &str,
    ) -> Result<Option<QueryResult>, VerseServiceError> {
        let target = self.resolve(reference, translation)?;
        let hit = self.find_cached(translation, &target)?;
        debug!(
            "event=verse_lookup module=service status=ok user_id={} reference={} translation={} hit={}",
            ctx.user_id,
            target.reference,
            translation,
            hit.is_some()
        );
        Ok(hit)
    }

    /// Fetches one source-chosen verse and stores it like any other query.
    pub fn fetch_random_and_save(
        &mut self,
        ctx: &RequestContext,
        translation: &str,
    ) -> Result<QueryResult, VerseServiceError> {
        let started_at = Instant::now();
        self.wait_for_request_slot();
        let fetched = self.source.fetch_random(translation);
        self.last_fetch_at = Some(Instant::now());
        let mut passage = fetched.map_err(|err| log_fetch_failure(ctx, "random", err))?;

        let Some((book_id, chapter)) = passage
            .verses
            .first()
            .map(|first| (first.book_id.clone(), first.chapter))
        else {
            return Err(VerseServiceError::EmptyPassage(passage.reference.clone()));
        };
        let book = SqliteBookRepository::try_new(&*self.conn)?
            .get(&book_id)?
            .ok_or_else(|| VerseServiceError::UnknownBook(book_id.clone()))?;

        // The stored key spans one chapter; verses past its end are dropped.
        let returned = passage.verses.len();
        passage
            .verses
            .retain(|verse| verse.book_id == book_id && verse.chapter == chapter);
        if passage.verses.len() < returned {
            info!(
                "event=verse_fetch module=service status=trimmed user_id={} reference=random kept={} returned={}",
                ctx.user_id,
                passage.verses.len(),
                returned
            );
        }
        let numbers = passage.verses.iter().map(|verse| verse.verse);
        let start = numbers.clone().min().unwrap_or(1);
        let end = numbers.max().unwrap_or(start);
        let range = VerseRange::Span { start, end };

        let target = Target {
            reference: format_reference(&book.name, chapter, range),
            book,
            chapter,
            range,
        };
        let result = self.store(translation, target, passage)?;
        log_result(ctx, &result, translation, started_at);
        Ok(result)
    }

    fn resolve(&self, reference: &str, translation: &str) -> Result<Target, VerseServiceError> {
        let parsed = Reference::parse(reference)?;
        let conn: &Connection = &*self.conn;

        let book = SqliteBookRepository::try_new(conn)?
            .find_by_name(&parsed.book)?
            .ok_or_else(|| VerseServiceError::UnknownBook(parsed.book.clone()))?;

        let bounds = SqliteBoundsRepository::try_new(conn)?;
        let max_chapter = bounds
            .get_bound(&BoundKey::book(book.id.clone(), translation))?
            .unwrap_or(book.chapters);
        if parsed.chapter > max_chapter {
            return Err(VerseServiceError::ChapterOutOfRange {
                book: book.name,
                chapter: parsed.chapter,
                max: max_chapter,
            });
        }

        if let Some(verse) = parsed.range.start() {
            let chapter_key = BoundKey::chapter(book.id.clone(), parsed.chapter, translation);
            if let Some(max_verse) = bounds.get_bound(&chapter_key)? {
                if verse > max_verse {
                    return Err(VerseServiceError::VerseOutOfRange {
                        book: book.name,
                        chapter: parsed.chapter,
                        verse,
                        max: max_verse,
                    });
                }
            }
        }

        Ok(Target {
            reference: format_reference(&book.name, parsed.chapter, parsed.range),
            book,
            chapter: parsed.chapter,
            range: parsed.range,
        })
    }

    fn find_cached(
        &self,
        translation: &str,
        target: &Target,
    ) -> Result<Option<QueryResult>, RepoError> {
        let conn: &Connection = &*self.conn;
        let Some(translation) =
            SqliteTranslationRepository::try_new(conn)?.find_by_abbreviation(translation)?
        else {
            return Ok(None);
        };
        let key = target_key(translation.id, target);
        load_result(conn, &key, translation, &target.book, FetchOrigin::Cache)
    }

    fn store(
        &mut self,
        translation: &str,
        target: Target,
        passage: Passage,
    ) -> Result<QueryResult, VerseServiceError> {
        if passage.verses.is_empty() {
            return Err(VerseServiceError::EmptyPassage(target.reference));
        }
        let persist_error = |source: RepoError| VerseServiceError::Persist {
            reference: target.reference.clone(),
            source,
        };

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| persist_error(err.into()))?;
        let translation_id =
            persist_passage(&tx, translation, &target, &passage).map_err(persist_error)?;
        tx.commit().map_err(|err| persist_error(err.into()))?;

        let conn: &Connection = &*self.conn;
        let translation_row = SqliteTranslationRepository::try_new(conn)?
            .get(translation_id)?
            .ok_or(VerseServiceError::InconsistentState(
                "translation missing after commit",
            ))?;
        let key = target_key(translation_id, &target);
        load_result(conn, &key, translation_row, &target.book, FetchOrigin::Remote)?.ok_or(
            VerseServiceError::InconsistentState("query missing after commit"),
        )
    }

    fn wait_for_request_slot(&self) {
        let Some(last_fetch_at) = self.last_fetch_at else {
            return;
        };
        if let Some(remaining) = self
            .options
            .request_delay
            .checked_sub(last_fetch_at.elapsed())
        {
            if !remaining.is_zero() {
                debug!(
                    "event=fetch_throttle module=service status=wait wait_ms={}",
                    remaining.as_millis()
                );
                std::thread::sleep(remaining);
            }
        }
    }
}

/// Writes one fetched passage inside `tx` and returns the translation id.
///
/// If another writer stored the same query first, its rows are kept as-is.
fn persist_passage(
    tx: &Transaction<'_>,
    translation: &str,
    target: &Target,
    passage: &Passage,
) -> Result<TranslationId, RepoError> {
    let conn: &Connection = tx;
    let new_translation = NewTranslation::new(
        translation,
        passage.translation.name.clone(),
        passage.translation.language.clone(),
    );
    let translation_id = SqliteTranslationRepository::try_new(conn)?.get_or_create(&new_translation)?;

    let key = target_key(translation_id, target);
    let verses = SqliteVerseRepository::try_new(conn)?;
    if verses.find_query(&key)?.is_some() {
        return Ok(translation_id);
    }

    let query_id = verses.create_query(&NewQuery {
        key,
        reference: target.reference.clone(),
    })?;
    for (position, verse) in (0u32..).zip(passage.verses.iter()) {
        let verse_id = verses.upsert_verse(&NewVerse {
            translation_id,
            book_id: verse.book_id.clone(),
            chapter: verse.chapter,
            verse: verse.verse,
            text: verse.text.clone(),
        })?;
        verses.link_verse(query_id, verse_id, position)?;
    }

    if target.range == VerseRange::WholeChapter {
        let max_verse = passage
            .verses
            .iter()
            .filter(|verse| verse.book_id == target.book.id && verse.chapter == target.chapter)
            .map(|verse| verse.verse)
            .max();
        if let Some(max_verse) = max_verse {
            SqliteBoundsRepository::try_new(conn)?.set_bound(
                &BoundKey::chapter(target.book.id.clone(), target.chapter, translation),
                max_verse,
            )?;
        }
    }

    Ok(translation_id)
}

fn target_key(translation_id: TranslationId, target: &Target) -> QueryKey {
    QueryKey {
        translation_id,
        book_id: target.book.id.clone(),
        chapter: target.chapter,
        range: target.range,
    }
}

fn load_result(
    conn: &Connection,
    key: &QueryKey,
    translation: Translation,
    book: &Book,
    origin: FetchOrigin,
) -> Result<Option<QueryResult>, RepoError> {
    let verses = SqliteVerseRepository::try_new(conn)?;
    let Some(query) = verses.find_query(key)? else {
        return Ok(None);
    };
    let rows = verses.query_verses(query.id)?;
    Ok(Some(QueryResult {
        query,
        translation,
        book: book.clone(),
        verses: rows,
        origin,
    }))
}

fn log_result(ctx: &RequestContext, result: &QueryResult, translation: &str, started_at: Instant) {
    info!(
        "event=verse_fetch module=service status=ok origin={} user_id={} reference={} translation={} verses={} duration_ms={}",
        result.origin.as_str(),
        ctx.user_id,
        result.query.reference,
        translation,
        result.verses.len(),
        started_at.elapsed().as_millis()
    );
}

fn log_fetch_failure(ctx: &RequestContext, reference: &str, err: FetchError) -> VerseServiceError {
    warn!(
        "event=verse_fetch module=service status=error user_id={} reference={} error={}",
        ctx.user_id, reference, err
    );
    VerseServiceError::Fetch(err)
}
