//! Cloud Document Store Abstraction
//!
//! Per-user remote collection of saved books, addressed as
//! `users/{uid}/books/{bookId}`. Implementations live in `provider-firestore`.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::Result;

/// Highest accepted reading progress, in percent.
pub const MAX_READING_PROGRESS: u8 = 100;

/// Remote projection of a saved book plus engagement metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudBookDocument {
    pub id: String,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub thumbnail_url: String,
    #[serde(default)]
    pub published_date: String,
    #[serde(default)]
    pub page_count: u32,
    #[serde(default)]
    pub categories: Vec<String>,
    /// Stored reading status name (`READING`, `WANT_TO_READ`, ...).
    #[serde(default = "default_reading_status")]
    pub reading_status: String,
    /// Unix timestamp in milliseconds.
    #[serde(default)]
    pub saved_date: i64,
    #[serde(default)]
    pub is_liked: bool,
    #[serde(default)]
    pub reading_progress: u8,
    #[serde(default)]
    pub notes: String,
}

fn default_reading_status() -> String {
    "NONE".to_string()
}

impl CloudBookDocument {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Document id cannot be empty".to_string());
        }
        if self.reading_progress > MAX_READING_PROGRESS {
            return Err(format!(
                "Reading progress must be between 0 and {}, got {}",
                MAX_READING_PROGRESS, self.reading_progress
            ));
        }
        Ok(())
    }
}

/// Partial update of a document's engagement fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngagementUpdate {
    ReadingProgress(u8),
    Liked(bool),
    Notes(String),
}

impl EngagementUpdate {
    /// Remote field touched by this update.
    pub fn field_name(&self) -> &'static str {
        match self {
            EngagementUpdate::ReadingProgress(_) => "readingProgress",
            EngagementUpdate::Liked(_) => "isLiked",
            EngagementUpdate::Notes(_) => "notes",
        }
    }

    /// Apply the update to an in-memory document.
    pub fn apply(&self, document: &mut CloudBookDocument) {
        match self {
            EngagementUpdate::ReadingProgress(progress) => document.reading_progress = *progress,
            EngagementUpdate::Liked(liked) => document.is_liked = *liked,
            EngagementUpdate::Notes(notes) => document.notes = notes.clone(),
        }
    }
}

/// Live sequence of full collection snapshots.
///
/// The first item is the collection at subscription time; each following item
/// is the whole collection after a change. Dropping the stream releases the
/// underlying listener.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Result<Vec<CloudBookDocument>>> + Send>>;

/// Remote per-user book collection.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::CloudBookStore;
/// use futures::StreamExt;
///
/// async fn first_snapshot(store: &dyn CloudBookStore, uid: &str) -> Result<usize> {
///     let mut snapshots = store.watch_collection(uid).await?;
///     let books = snapshots.next().await.transpose()?.unwrap_or_default();
///     Ok(books.len())
/// }
/// ```
#[async_trait]
pub trait CloudBookStore: Send + Sync {
    /// Insert or fully replace a document.
    async fn upsert(&self, user_id: &str, document: CloudBookDocument) -> Result<()>;

    /// Fetch one document.
    async fn get(&self, user_id: &str, book_id: &str) -> Result<Option<CloudBookDocument>>;

    /// Delete a document. Deleting an absent document succeeds.
    async fn delete(&self, user_id: &str, book_id: &str) -> Result<()>;

    /// Update a single engagement field of an existing document.
    async fn update_engagement(
        &self,
        user_id: &str,
        book_id: &str,
        update: EngagementUpdate,
    ) -> Result<()>;

    /// One-shot read of the whole collection.
    async fn list(&self, user_id: &str) -> Result<Vec<CloudBookDocument>>;

    /// Subscribe to the collection.
    async fn watch_collection(&self, user_id: &str) -> Result<SnapshotStream>;
}
