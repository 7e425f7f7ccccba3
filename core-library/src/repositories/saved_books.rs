//! Saved-book repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::{Book, SavedBookRow};
use async_trait::async_trait;
use bridge_traits::time::{Clock, SystemClock};
use futures::Stream;
use sqlx::{query_as, SqlitePool};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, instrument};

/// Live sequence of a user's saved books, ordered by title.
pub type BookListStream = Pin<Box<dyn Stream<Item = Result<Vec<Book>>> + Send>>;

/// Saved-book repository interface.
///
/// Rows are keyed by `(book id, user id)`; every method is scoped to one user.
#[async_trait]
pub trait SavedBookRepository: Send + Sync {
    /// Insert or replace a book for `user_id`, stamping the save time.
    ///
    /// # Errors
    /// Returns error if validation fails or a database error occurs
    async fn upsert(&self, book: &Book, user_id: &str) -> Result<()>;

    /// Delete a book for `user_id`
    ///
    /// # Returns
    /// - `Ok(true)` if a row was deleted
    /// - `Ok(false)` if there was nothing to delete
    async fn delete(&self, book_id: &str, user_id: &str) -> Result<bool>;

    /// Delete every row of `user_id`, returning the number removed
    async fn delete_all_for_user(&self, user_id: &str) -> Result<u64>;

    /// Find one book
    async fn find(&self, book_id: &str, user_id: &str) -> Result<Option<Book>>;

    /// Whether the book is saved for `user_id`
    async fn exists(&self, book_id: &str, user_id: &str) -> Result<bool>;

    /// All books of `user_id`, ordered by title
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Book>>;

    /// Number of books saved by `user_id`
    async fn count_for_user(&self, user_id: &str) -> Result<i64>;

    /// Live view of `user_id`'s books.
    ///
    /// Emits the current rows immediately, then again after every write made
    /// through this repository. Consumers that fall behind only see the
    /// latest state.
    fn watch_user_books(&self, user_id: &str) -> BookListStream;
}

/// SQLite implementation of SavedBookRepository
pub struct SqliteSavedBookRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    changes: watch::Sender<u64>,
}

impl SqliteSavedBookRepository {
    /// Create a new repository stamping rows with the system clock
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            pool,
            clock,
            changes,
        }
    }

    fn notify_changed(&self) {
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
    }
}

async fn list_books(pool: &SqlitePool, user_id: &str) -> Result<Vec<Book>> {
    let rows = query_as::<_, SavedBookRow>(
        "SELECT * FROM saved_books WHERE user_id = ? ORDER BY title COLLATE NOCASE, id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(SavedBookRow::into_book).collect())
}

#[async_trait]
impl SavedBookRepository for SqliteSavedBookRepository {
    #[instrument(skip(self, book), fields(book_id = %book.id))]
    async fn upsert(&self, book: &Book, user_id: &str) -> Result<()> {
        book.validate().map_err(|msg| LibraryError::InvalidInput {
            field: "book".to_string(),
            message: msg,
        })?;

        if user_id.trim().is_empty() {
            return Err(LibraryError::InvalidInput {
                field: "user_id".to_string(),
                message: "User id cannot be empty".to_string(),
            });
        }

        let row = SavedBookRow::from_book(book, user_id, self.clock.unix_timestamp_millis());

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO saved_books (
                id, user_id, title, author, description, thumbnail_url,
                published_date, page_count, categories, reading_status, saved_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.user_id)
        .bind(&row.title)
        .bind(&row.author)
        .bind(&row.description)
        .bind(&row.thumbnail_url)
        .bind(&row.published_date)
        .bind(row.page_count)
        .bind(&row.categories)
        .bind(&row.reading_status)
        .bind(row.saved_at)
        .execute(&self.pool)
        .await?;

        debug!("Saved book cached");
        self.notify_changed();
        Ok(())
    }

    async fn delete(&self, book_id: &str, user_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM saved_books WHERE id = ? AND user_id = ?")
            .bind(book_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            self.notify_changed();
        }
        Ok(deleted)
    }

    async fn delete_all_for_user(&self, user_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM saved_books WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            self.notify_changed();
        }
        Ok(removed)
    }

    async fn find(&self, book_id: &str, user_id: &str) -> Result<Option<Book>> {
        let row = query_as::<_, SavedBookRow>(
            "SELECT * FROM saved_books WHERE id = ? AND user_id = ?",
        )
        .bind(book_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SavedBookRow::into_book))
    }

    async fn exists(&self, book_id: &str, user_id: &str) -> Result<bool> {
        let found: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM saved_books WHERE id = ? AND user_id = ?")
                .bind(book_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(found.is_some())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Book>> {
        list_books(&self.pool, user_id).await
    }

    async fn count_for_user(&self, user_id: &str) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM saved_books WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    fn watch_user_books(&self, user_id: &str) -> BookListStream {
        let pool = self.pool.clone();
        let user_id = user_id.to_string();
        let receiver = self.changes.subscribe();

        Box::pin(futures::stream::unfold(
            (receiver, true),
            move |(mut receiver, first)| {
                let pool = pool.clone();
                let user_id = user_id.clone();
                async move {
                    if !first && receiver.changed().await.is_err() {
                        return None;
                    }
                    let snapshot = list_books(&pool, &user_id).await;
                    Some((snapshot, (receiver, false)))
                }
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::ReadingStatus;
    use bridge_traits::time::FixedClock;
    use futures::StreamExt;
    use std::time::Duration;

    async fn repository() -> SqliteSavedBookRepository {
        let pool = create_test_pool().await.unwrap();
        SqliteSavedBookRepository::with_clock(pool, Arc::new(FixedClock::from_millis(1_000)))
    }

    fn book(id: &str, title: &str) -> Book {
        Book::new(id, title, "Author")
            .with_categories(vec!["Fiction".to_string()])
            .with_status(ReadingStatus::WantToRead)
    }

    #[tokio::test]
    async fn test_upsert_and_find() {
        let repo = repository().await;
        repo.upsert(&book("b1", "Dune"), "u1").await.unwrap();

        let found = repo.find("b1", "u1").await.unwrap().unwrap();
        assert_eq!(found.title, "Dune");
        assert_eq!(found.categories, vec!["Fiction"]);
        assert_eq!(found.status, ReadingStatus::WantToRead);
        assert_eq!(found.user_id.as_deref(), Some("u1"));

        assert!(repo.find("b1", "u2").await.unwrap().is_none());
        assert!(repo.exists("b1", "u1").await.unwrap());
        assert!(!repo.exists("b1", "u2").await.unwrap());
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_row() {
        let repo = repository().await;
        repo.upsert(&book("b1", "Dune"), "u1").await.unwrap();
        repo.upsert(
            &book("b1", "Dune Messiah").with_status(ReadingStatus::Finished),
            "u1",
        )
        .await
        .unwrap();

        assert_eq!(repo.count_for_user("u1").await.unwrap(), 1);
        let found = repo.find("b1", "u1").await.unwrap().unwrap();
        assert_eq!(found.title, "Dune Messiah");
        assert_eq!(found.status, ReadingStatus::Finished);
    }

    #[tokio::test]
    async fn test_same_book_for_two_users() {
        let repo = repository().await;
        repo.upsert(&book("b1", "Dune"), "u1").await.unwrap();
        repo.upsert(&book("b1", "Dune"), "u2").await.unwrap();

        assert_eq!(repo.count_for_user("u1").await.unwrap(), 1);
        assert_eq!(repo.count_for_user("u2").await.unwrap(), 1);

        assert!(repo.delete("b1", "u1").await.unwrap());
        assert!(repo.exists("b1", "u2").await.unwrap());
    }

    #[tokio::test]
    async fn test_upsert_rejects_invalid_book() {
        let repo = repository().await;

        let result = repo.upsert(&Book::new(" ", "Dune", "A"), "u1").await;
        assert!(matches!(result, Err(LibraryError::InvalidInput { .. })));

        let result = repo.upsert(&book("b1", "Dune"), " ").await;
        assert!(matches!(result, Err(LibraryError::InvalidInput { .. })));
        assert_eq!(repo.count_for_user("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upsert_accepts_untitled_book() {
        let repo = repository().await;

        repo.upsert(&Book::new("b1", "", "A"), "u1").await.unwrap();

        let cached = repo.find("b1", "u1").await.unwrap().unwrap();
        assert!(cached.title.is_empty());
    }

    #[tokio::test]
    async fn test_delete_absent_book_is_not_an_error() {
        let repo = repository().await;
        assert!(!repo.delete("missing", "u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_is_ordered_by_title() {
        let repo = repository().await;
        repo.upsert(&book("b2", "zen"), "u1").await.unwrap();
        repo.upsert(&book("b1", "Atlas"), "u1").await.unwrap();
        repo.upsert(&book("b3", "middlemarch"), "u1").await.unwrap();

        let titles: Vec<_> = repo
            .list_for_user("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.title)
            .collect();
        assert_eq!(titles, vec!["Atlas", "middlemarch", "zen"]);
    }

    #[tokio::test]
    async fn test_delete_all_for_user() {
        let repo = repository().await;
        repo.upsert(&book("b1", "A"), "u1").await.unwrap();
        repo.upsert(&book("b2", "B"), "u1").await.unwrap();
        repo.upsert(&book("b3", "C"), "u2").await.unwrap();

        assert_eq!(repo.delete_all_for_user("u1").await.unwrap(), 2);
        assert_eq!(repo.count_for_user("u1").await.unwrap(), 0);
        assert_eq!(repo.count_for_user("u2").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_saved_at_comes_from_clock() {
        let repo = repository().await;
        repo.upsert(&book("b1", "A"), "u1").await.unwrap();

        let (saved_at,): (i64,) = sqlx::query_as("SELECT saved_at FROM saved_books WHERE id = 'b1'")
            .fetch_one(&repo.pool)
            .await
            .unwrap();
        assert_eq!(saved_at, 1_000);
    }

    #[tokio::test]
    async fn test_watch_emits_current_then_changes() {
        let repo = repository().await;
        repo.upsert(&book("b1", "A"), "u1").await.unwrap();

        let mut stream = repo.watch_user_books("u1");
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 1);

        repo.upsert(&book("b2", "B"), "u1").await.unwrap();
        let second = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(second.len(), 2);

        repo.delete("b1", "u1").await.unwrap();
        let third = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(third.iter().map(|b| b.id.as_str()).collect::<Vec<_>>(), vec!["b2"]);
    }

    #[tokio::test]
    async fn test_watch_only_sees_own_user() {
        let repo = repository().await;
        let mut stream = repo.watch_user_books("u2");
        assert!(stream.next().await.unwrap().unwrap().is_empty());

        repo.upsert(&book("b1", "A"), "u1").await.unwrap();
        let next = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(next.is_empty());
    }
}
