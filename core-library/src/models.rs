//! Domain models for the saved-book library
//!
//! [`Book`] is the domain entity shared by search results, the local cache and
//! the cloud collection. [`SavedBookRow`] is its SQLite projection and
//! [`CloudBookDocument`] its remote projection.

use bridge_traits::storage::CloudBookDocument;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

// =============================================================================
// Reading status
// =============================================================================

/// Shelf a saved book belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReadingStatus {
    Reading,
    WantToRead,
    Finished,
    DidNotFinish,
    #[default]
    None,
}

impl ReadingStatus {
    pub const ALL: [ReadingStatus; 5] = [
        ReadingStatus::Reading,
        ReadingStatus::WantToRead,
        ReadingStatus::Finished,
        ReadingStatus::DidNotFinish,
        ReadingStatus::None,
    ];

    /// Name persisted in both stores.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingStatus::Reading => "READING",
            ReadingStatus::WantToRead => "WANT_TO_READ",
            ReadingStatus::Finished => "FINISHED",
            ReadingStatus::DidNotFinish => "DID_NOT_FINISH",
            ReadingStatus::None => "NONE",
        }
    }

    /// Label shown to users.
    pub fn display_name(&self) -> &'static str {
        match self {
            ReadingStatus::Reading => "Currently Reading",
            ReadingStatus::WantToRead => "Want to Read",
            ReadingStatus::Finished => "Finished Reading",
            ReadingStatus::DidNotFinish => "Did Not Finish",
            ReadingStatus::None => "No Group",
        }
    }

    /// Parse a stored name. Unknown values fall back to [`ReadingStatus::None`].
    pub fn from_stored(value: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .unwrap_or_default()
    }
}

impl fmt::Display for ReadingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

// =============================================================================
// Book
// =============================================================================

/// A book, as found in the catalog or saved by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Catalog volume id, or a generated UUID for hand-made entries
    pub id: String,
    pub title: String,
    pub author: String,
    pub description: String,
    pub thumbnail_url: String,
    /// Free-form publication date as given by the catalog
    pub published_date: String,
    pub page_count: u32,
    pub categories: Vec<String>,
    pub status: ReadingStatus,
    /// Owning user once the book is persisted
    pub user_id: Option<String>,
}

impl Book {
    pub fn new(id: impl Into<String>, title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            author: author.into(),
            description: String::new(),
            thumbnail_url: String::new(),
            published_date: String::new(),
            page_count: 0,
            categories: Vec::new(),
            status: ReadingStatus::None,
            user_id: None,
        }
    }

    /// Book without a catalog id; gets a fresh UUID.
    pub fn with_generated_id(title: impl Into<String>, author: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4().to_string(), title, author)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail_url = url.into();
        self
    }

    pub fn with_published_date(mut self, date: impl Into<String>) -> Self {
        self.published_date = date.into();
        self
    }

    pub fn with_page_count(mut self, page_count: u32) -> Self {
        self.page_count = page_count;
        self
    }

    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_status(mut self, status: ReadingStatus) -> Self {
        self.status = status;
        self
    }

    pub fn has_thumbnail(&self) -> bool {
        !self.thumbnail_url.trim().is_empty()
    }

    /// Only the id is required; cloud records may carry an empty title.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Book id cannot be empty".to_string());
        }

        Ok(())
    }

    /// Remote projection with default engagement values.
    pub fn to_cloud_document(&self, saved_date_millis: i64) -> CloudBookDocument {
        CloudBookDocument {
            id: self.id.clone(),
            title: self.title.clone(),
            author: self.author.clone(),
            description: self.description.clone(),
            thumbnail_url: self.thumbnail_url.clone(),
            published_date: self.published_date.clone(),
            page_count: self.page_count,
            categories: self.categories.clone(),
            reading_status: self.status.as_str().to_string(),
            saved_date: saved_date_millis,
            is_liked: false,
            reading_progress: 0,
            notes: String::new(),
        }
    }

    pub fn from_cloud_document(document: &CloudBookDocument) -> Self {
        Self {
            id: document.id.clone(),
            title: document.title.clone(),
            author: document.author.clone(),
            description: document.description.clone(),
            thumbnail_url: document.thumbnail_url.clone(),
            published_date: document.published_date.clone(),
            page_count: document.page_count,
            categories: document.categories.clone(),
            status: ReadingStatus::from_stored(&document.reading_status),
            user_id: None,
        }
    }
}

// =============================================================================
// Local row
// =============================================================================

const CATEGORY_SEPARATOR: char = ',';
const CATEGORY_ESCAPE: char = '\\';

/// Join categories for storage in a single column.
///
/// Separators and backslashes inside a category are prefixed with a backslash so
/// [`decode_categories`] restores the original list.
pub fn encode_categories(categories: &[String]) -> String {
    let mut encoded = String::new();
    for (index, category) in categories.iter().enumerate() {
        if index > 0 {
            encoded.push(CATEGORY_SEPARATOR);
        }
        for c in category.chars() {
            if c == CATEGORY_SEPARATOR || c == CATEGORY_ESCAPE {
                encoded.push(CATEGORY_ESCAPE);
            }
            encoded.push(c);
        }
    }
    encoded
}

/// Split a stored category column on unescaped separators, dropping empty
/// segments.
pub fn decode_categories(stored: &str) -> Vec<String> {
    let mut categories = Vec::new();
    let mut current = String::new();
    let mut chars = stored.chars();

    while let Some(c) = chars.next() {
        match c {
            CATEGORY_ESCAPE => {
                // A trailing escape is kept as-is.
                current.push(chars.next().unwrap_or(CATEGORY_ESCAPE));
            }
            CATEGORY_SEPARATOR => {
                if !current.is_empty() {
                    categories.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        categories.push(current);
    }
    categories
}

/// Row of the `saved_books` table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct SavedBookRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub author: String,
    pub description: String,
    pub thumbnail_url: String,
    pub published_date: String,
    pub page_count: i64,
    pub categories: String,
    pub reading_status: String,
    /// Unix timestamp in milliseconds
    pub saved_at: i64,
}

impl SavedBookRow {
    pub fn from_book(book: &Book, user_id: &str, saved_at: i64) -> Self {
        Self {
            id: book.id.clone(),
            user_id: user_id.to_string(),
            title: book.title.clone(),
            author: book.author.clone(),
            description: book.description.clone(),
            thumbnail_url: book.thumbnail_url.clone(),
            published_date: book.published_date.clone(),
            page_count: i64::from(book.page_count),
            categories: encode_categories(&book.categories),
            reading_status: book.status.as_str().to_string(),
            saved_at,
        }
    }

    pub fn into_book(self) -> Book {
        Book {
            id: self.id,
            title: self.title,
            author: self.author,
            description: self.description,
            thumbnail_url: self.thumbnail_url,
            published_date: self.published_date,
            page_count: u32::try_from(self.page_count).unwrap_or(0),
            categories: decode_categories(&self.categories),
            status: ReadingStatus::from_stored(&self.reading_status),
            user_id: Some(self.user_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_book() -> Book {
        Book::new("zyTCAlFPjgYC", "The Google Story", "David A. Vise")
            .with_description("Inside the hottest business")
            .with_thumbnail("https://books.google.com/cover.jpg")
            .with_published_date("2005-11-15")
            .with_page_count(207)
            .with_categories(vec!["Business".to_string(), "Economics".to_string()])
            .with_status(ReadingStatus::Reading)
    }

    #[test]
    fn test_reading_status_names() {
        assert_eq!(ReadingStatus::WantToRead.as_str(), "WANT_TO_READ");
        assert_eq!(ReadingStatus::Finished.display_name(), "Finished Reading");
        assert_eq!(ReadingStatus::None.to_string(), "No Group");

        for status in ReadingStatus::ALL {
            assert_eq!(ReadingStatus::from_stored(status.as_str()), status);
        }
        assert_eq!(ReadingStatus::from_stored("SHELVED"), ReadingStatus::None);
        assert_eq!(ReadingStatus::from_stored(""), ReadingStatus::None);
    }

    #[test]
    fn test_reading_status_serde() {
        let json = serde_json::to_string(&ReadingStatus::DidNotFinish).unwrap();
        assert_eq!(json, "\"DID_NOT_FINISH\"");
    }

    #[test]
    fn test_categories_codec() {
        assert_eq!(
            encode_categories(&["Fiction".to_string(), "Classics".to_string()]),
            "Fiction,Classics"
        );
        assert_eq!(encode_categories(&[]), "");
        assert!(decode_categories("").is_empty());
        assert_eq!(decode_categories("Fiction,,Classics,"), vec!["Fiction", "Classics"]);
    }

    #[test]
    fn test_categories_codec_escapes_separator() {
        let categories = vec![
            "Fiction, Classic".to_string(),
            "C:\\Temp".to_string(),
            "Poetry".to_string(),
        ];
        let encoded = encode_categories(&categories);

        assert_eq!(encoded, "Fiction\\, Classic,C:\\\\Temp,Poetry");
        assert_eq!(decode_categories(&encoded), categories);
    }

    #[test]
    fn test_validate() {
        assert!(sample_book().validate().is_ok());
        assert!(Book::new("", "Title", "A").validate().is_err());
        assert!(Book::new("  ", "Title", "A").validate().is_err());
        assert!(Book::new("id", "", "A").validate().is_ok());
        assert!(Book::new("id", "T", "A")
            .with_categories(vec!["Science, Fiction".to_string()])
            .validate()
            .is_ok());
    }

    #[test]
    fn test_generated_id_is_uuid() {
        let book = Book::with_generated_id("Notes", "Me");
        assert!(Uuid::parse_str(&book.id).is_ok());
    }

    #[test]
    fn test_row_projection_keeps_fields() {
        let book = sample_book();
        let row = SavedBookRow::from_book(&book, "u1", 1_700_000_000_000);

        assert_eq!(row.categories, "Business,Economics");
        assert_eq!(row.reading_status, "READING");

        let restored = row.into_book();
        assert_eq!(restored.user_id.as_deref(), Some("u1"));
        assert_eq!(Book { user_id: None, ..restored }, book);
    }

    #[test]
    fn test_row_projection_keeps_comma_categories() {
        let book = Book::new("b", "", "Author")
            .with_categories(vec!["Fiction, Classic".to_string(), "Drama".to_string()]);

        let restored = SavedBookRow::from_book(&book, "u1", 0).into_book();
        assert_eq!(restored.categories, book.categories);
        assert!(restored.title.is_empty());
    }

    #[test]
    fn test_cloud_projection_defaults_engagement() {
        let book = sample_book();
        let document = book.to_cloud_document(42);

        assert_eq!(document.saved_date, 42);
        assert!(!document.is_liked);
        assert_eq!(document.reading_progress, 0);
        assert!(document.notes.is_empty());
        assert_eq!(document.reading_status, "READING");
        assert_eq!(Book::from_cloud_document(&document), book);
    }
}
