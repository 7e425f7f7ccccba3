//! Google Books API Client
//!
//! ## API Endpoints
//!
//! - **Search**: `{base}/volumes?q={query}&maxResults={n}&fields=items(id,volumeInfo)&orderBy=relevance`
//!
//! An API key is optional; anonymous requests share a lower daily quota.
//!
//! ## Usage
//!
//! ```ignore
//! use core_catalog::{BookCatalog, GoogleBooksClient};
//! use core_runtime::config::CatalogConfig;
//!
//! let client = GoogleBooksClient::new(http_client, CatalogConfig::default());
//! let books = client.search("dune herbert", 20).await?;
//! ```

use crate::error::{CatalogError, Result};
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use core_library::Book;
use core_runtime::config::{CatalogConfig, CATALOG_MAX_RESULTS_LIMIT};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Fields requested from the volumes endpoint
const VOLUME_FIELDS: &str = "items(id,volumeInfo)";

const UNKNOWN_TITLE: &str = "Unknown Title";
const UNKNOWN_AUTHOR: &str = "Unknown Author";

/// Searchable book catalog.
#[async_trait]
pub trait BookCatalog: Send + Sync {
    /// Search the catalog. A blank query yields an empty list without I/O.
    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<Book>>;
}

#[derive(Debug, Default, Deserialize)]
struct VolumesResponse {
    #[serde(default)]
    items: Vec<Volume>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Volume {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    volume_info: VolumeInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeInfo {
    title: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    description: Option<String>,
    image_links: Option<ImageLinks>,
    published_date: Option<String>,
    page_count: Option<u32>,
    #[serde(default)]
    categories: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageLinks {
    thumbnail: Option<String>,
    small_thumbnail: Option<String>,
}

/// Google Books volumes client
pub struct GoogleBooksClient {
    http_client: Arc<dyn HttpClient>,
    config: CatalogConfig,
}

impl GoogleBooksClient {
    pub fn new(http_client: Arc<dyn HttpClient>, config: CatalogConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    /// Result count used when the caller has no preference.
    pub fn default_max_results(&self) -> u32 {
        self.config.max_results
    }

    fn search_url(&self, query: &str, max_results: u32) -> String {
        let mut url = format!(
            "{}/volumes?q={}&maxResults={}&fields={}&orderBy=relevance",
            self.config.base_url.trim_end_matches('/'),
            urlencoding::encode(query),
            max_results,
            urlencoding::encode(VOLUME_FIELDS)
        );
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            url.push_str("&key=");
            url.push_str(&urlencoding::encode(key));
        }
        url
    }

    fn convert_volume(volume: Volume) -> Option<Book> {
        let id = match volume.id.filter(|id| !id.trim().is_empty()) {
            Some(id) => id,
            None => {
                warn!("Skipping catalog item without id");
                return None;
            }
        };

        let info = volume.volume_info;
        let thumbnail = info
            .image_links
            .and_then(|links| links.thumbnail.or(links.small_thumbnail))
            .map(|url| secure_url(&url))
            .unwrap_or_default();

        let book = Book::new(
            id,
            info.title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            info.authors
                .into_iter()
                .next()
                .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
        )
        .with_description(info.description.unwrap_or_default())
        .with_thumbnail(thumbnail)
        .with_published_date(info.published_date.unwrap_or_default())
        .with_page_count(info.page_count.unwrap_or(0))
        .with_categories(info.categories);

        Some(book)
    }
}

/// Upgrade `http://` image links so they load under strict transport rules.
fn secure_url(url: &str) -> String {
    match url.strip_prefix("http://") {
        Some(rest) => format!("https://{}", rest),
        None => url.to_string(),
    }
}

#[async_trait]
impl BookCatalog for GoogleBooksClient {
    #[instrument(skip(self), fields(query_len = query.len()))]
    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<Book>> {
        let query = query.trim();
        if query.is_empty() {
            debug!("Blank catalog query");
            return Ok(Vec::new());
        }

        let max_results = max_results.clamp(1, CATALOG_MAX_RESULTS_LIMIT);
        let request = HttpRequest::new(HttpMethod::Get, self.search_url(query, max_results))
            .header("Accept", "application/json")
            .timeout(self.config.timeout);

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(CatalogError::from_transport)?;

        if !response.is_success() {
            warn!(status = response.status, "Catalog search failed");
            return Err(CatalogError::Server {
                status: response.status,
                body: String::from_utf8_lossy(&response.body).to_string(),
            });
        }

        let parsed: VolumesResponse = serde_json::from_slice(&response.body)
            .map_err(|e| CatalogError::Parse(format!("volumes response: {}", e)))?;

        let books: Vec<Book> = parsed
            .items
            .into_iter()
            .filter_map(Self::convert_volume)
            .collect();

        info!(results = books.len(), "Catalog search completed");
        Ok(books)
    }
}
