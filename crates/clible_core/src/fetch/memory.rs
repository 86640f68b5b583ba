//! Deterministic in-process passage source for tests and offline use.

use super::{FetchError, FetchResult, Passage, PassageSource, PassageVerse, RemoteBook, TranslationInfo};
use crate::model::book::Book;
use crate::model::reference::{format_reference, VerseRange};
use crate::model::translation::normalize_abbreviation;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Passage source backed by verses registered up front.
///
/// Counts calls per operation and can be switched into a failing mode.
#[derive(Debug, Default)]
pub struct InMemoryPassageSource {
    translations: Vec<TranslationInfo>,
    verses: Vec<(String, PassageVerse)>,
    books: Vec<RemoteBook>,
    failure: Mutex<Option<FetchError>>,
    passage_calls: AtomicUsize,
    chapter_calls: AtomicUsize,
    random_calls: AtomicUsize,
    book_calls: AtomicUsize,
}

impl InMemoryPassageSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers translation metadata served alongside passages.
    pub fn with_translation(mut self, abbreviation: &str, name: &str, language: &str) -> Self {
        self.translations.push(TranslationInfo {
            abbreviation: abbreviation.trim().to_uppercase(),
            name: name.to_string(),
            language: language.to_string(),
        });
        self
    }

    /// Registers one verse. The translation must be registered separately.
    pub fn with_verse(mut self, translation: &str, verse: PassageVerse) -> Self {
        self.verses.push((normalize_abbreviation(translation), verse));
        self
    }

    pub fn with_book(mut self, id: &str, name: &str) -> Self {
        self.books.push(RemoteBook {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    /// Makes every call fail with `error` until cleared.
    pub fn with_failure(self, error: FetchError) -> Self {
        self.set_failure(Some(error));
        self
    }

    pub fn set_failure(&self, error: Option<FetchError>) {
        let mut guard = self
            .failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = error;
    }

    pub fn passage_calls(&self) -> usize {
        self.passage_calls.load(Ordering::SeqCst)
    }

    pub fn chapter_calls(&self) -> usize {
        self.chapter_calls.load(Ordering::SeqCst)
    }

    pub fn random_calls(&self) -> usize {
        self.random_calls.load(Ordering::SeqCst)
    }

    pub fn book_calls(&self) -> usize {
        self.book_calls.load(Ordering::SeqCst)
    }

    /// Sum of calls across all operations.
    pub fn total_calls(&self) -> usize {
        self.passage_calls() + self.chapter_calls() + self.random_calls() + self.book_calls()
    }

    fn check_failure(&self) -> FetchResult<()> {
        let guard = self
            .failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match guard.as_ref() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn translation(&self, translation: &str) -> FetchResult<TranslationInfo> {
        let wanted = normalize_abbreviation(translation);
        self.translations
            .iter()
            .find(|info| normalize_abbreviation(&info.abbreviation) == wanted)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(format!("translation `{translation}`")))
    }

    fn select(
        &self,
        translation: &str,
        book: &Book,
        chapter: u32,
        range: VerseRange,
    ) -> FetchResult<Passage> {
        self.check_failure()?;
        let info = self.translation(translation)?;
        let wanted = normalize_abbreviation(translation);

        let mut chapter_verses: Vec<&PassageVerse> = self
            .verses
            .iter()
            .filter(|(code, verse)| {
                *code == wanted && verse.book_id == book.id && verse.chapter == chapter
            })
            .map(|(_, verse)| verse)
            .collect();
        if chapter_verses.is_empty() {
            return Err(FetchError::NotFound(format_reference(
                &book.name, chapter, range,
            )));
        }
        chapter_verses.sort_by_key(|verse| verse.verse);

        let verses = chapter_verses
            .into_iter()
            .filter(|verse| match range {
                VerseRange::WholeChapter => true,
                VerseRange::Span { start, end } => (start..=end).contains(&verse.verse),
            })
            .cloned()
            .collect();

        Ok(Passage {
            translation: info,
            reference: format_reference(&book.name, chapter, range),
            verses,
        })
    }
}

impl PassageSource for InMemoryPassageSource {
    fn fetch_passage(
        &self,
        translation: &str,
        book: &Book,
        chapter: u32,
        verses: RangeInclusive<u32>,
    ) -> FetchResult<Passage> {
        self.passage_calls.fetch_add(1, Ordering::SeqCst);
        let range = VerseRange::Span {
            start: *verses.start(),
            end: *verses.end(),
        };
        self.select(translation, book, chapter, range)
    }

    fn fetch_chapter(
        &self,
        translation: &str,
        book: &Book,
        chapter: u32,
    ) -> FetchResult<Passage> {
        self.chapter_calls.fetch_add(1, Ordering::SeqCst);
        self.select(translation, book, chapter, VerseRange::WholeChapter)
    }

    /// Rotates through registered verses in registration order.
    fn fetch_random(&self, translation: &str) -> FetchResult<Passage> {
        let call = self.random_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        let info = self.translation(translation)?;
        let wanted = normalize_abbreviation(translation);

        let candidates: Vec<&PassageVerse> = self
            .verses
            .iter()
            .filter(|(code, _)| *code == wanted)
            .map(|(_, verse)| verse)
            .collect();
        if candidates.is_empty() {
            return Err(FetchError::NotFound(format!(
                "no verses for translation `{translation}`"
            )));
        }

        let verse = candidates[call % candidates.len()].clone();
        Ok(Passage {
            translation: info,
            reference: format_reference(
                &verse.book_name,
                verse.chapter,
                VerseRange::single(verse.verse),
            ),
            verses: vec![verse],
        })
    }

    fn list_books(&self) -> FetchResult<Vec<RemoteBook>> {
        self.book_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        Ok(self.books.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::InMemoryPassageSource;
    use crate::fetch::{FetchError, PassageSource, PassageVerse};
    use crate::model::book::{Book, Testament};

    fn john() -> Book {
        Book {
            id: "JHN".to_string(),
            name: "John".to_string(),
            testament: Testament::New,
            position: 43,
            chapters: 21,
        }
    }

    fn verse(number: u32, text: &str) -> PassageVerse {
        PassageVerse {
            book_id: "JHN".to_string(),
            book_name: "John".to_string(),
            chapter: 3,
            verse: number,
            text: text.to_string(),
        }
    }

    fn source() -> InMemoryPassageSource {
        InMemoryPassageSource::new()
            .with_translation("kjv", "King James Version", "en")
            .with_verse("KJV", verse(17, "For God sent not his Son"))
            .with_verse("KJV", verse(16, "For God so loved the world"))
    }

    #[test]
    fn passage_filters_range_and_sorts_by_verse() {
        let source = source();
        let chapter = source.fetch_chapter("kjv", &john(), 3).unwrap();
        assert_eq!(chapter.reference, "John 3");
        let numbers: Vec<u32> = chapter.verses.iter().map(|v| v.verse).collect();
        assert_eq!(numbers, vec![16, 17]);

        let single = source.fetch_passage("KJV", &john(), 3, 16..=16).unwrap();
        assert_eq!(single.reference, "John 3:16");
        assert_eq!(single.verses.len(), 1);
        assert_eq!(single.translation.abbreviation, "KJV");

        let beyond = source.fetch_passage("kjv", &john(), 3, 40..=41).unwrap();
        assert!(beyond.verses.is_empty());
        assert_eq!(source.passage_calls(), 2);
        assert_eq!(source.chapter_calls(), 1);
    }

    #[test]
    fn unknown_chapter_or_translation_is_not_found() {
        let source = source();
        assert!(matches!(
            source.fetch_chapter("kjv", &john(), 4),
            Err(FetchError::NotFound(_))
        ));
        assert!(matches!(
            source.fetch_chapter("esv", &john(), 3),
            Err(FetchError::NotFound(_))
        ));
    }

    #[test]
    fn failure_mode_applies_until_cleared() {
        let source = source().with_failure(FetchError::Generic("offline".to_string()));
        assert_eq!(
            source.fetch_random("kjv"),
            Err(FetchError::Generic("offline".to_string()))
        );
        source.set_failure(None);
        assert!(source.fetch_random("kjv").is_ok());
        assert_eq!(source.random_calls(), 2);
    }
}
