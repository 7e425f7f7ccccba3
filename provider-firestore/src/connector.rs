//! Firestore REST connector
//!
//! Implements `CloudBookStore` against Firestore REST v1. Documents live at
//! `projects/{project}/databases/{database}/documents/users/{uid}/books/{bookId}`.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::identity::{IdentityError, IdentityProvider};
use bridge_traits::storage::{
    CloudBookDocument, CloudBookStore, EngagementUpdate, SnapshotStream, MAX_READING_PROGRESS,
};
use core_runtime::config::FirestoreConfig;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, instrument, warn};

use crate::error::{FirestoreError, Result};
use crate::types::{Document, ErrorResponse, ListDocumentsResponse, Value};

/// Firestore REST API base URL
const FIRESTORE_API_BASE: &str = "https://firestore.googleapis.com/v1";

/// Documents requested per list page
const LIST_PAGE_SIZE: u32 = 300;

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Buffered snapshots per listener
const SNAPSHOT_BUFFER: usize = 4;

/// Firestore connector
///
/// Cheap to clone; clones share the HTTP client, identity provider and the
/// local-write signal that wakes active listeners.
///
/// # Example
///
/// ```ignore
/// use provider_firestore::FirestoreConnector;
/// use bridge_traits::storage::CloudBookStore;
///
/// let connector = FirestoreConnector::new(http_client, identity, &firestore_config);
/// let books = connector.list("uid-123").await?;
/// ```
#[derive(Clone)]
pub struct FirestoreConnector {
    http_client: Arc<dyn HttpClient>,
    identity: Arc<dyn IdentityProvider>,
    base_url: String,
    /// `projects/{p}/databases/{d}/documents`
    documents_root: String,
    poll_interval: Duration,
    retry_policy: RetryPolicy,
    local_writes: Arc<watch::Sender<u64>>,
}

impl FirestoreConnector {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        identity: Arc<dyn IdentityProvider>,
        config: &FirestoreConfig,
    ) -> Self {
        let (local_writes, _) = watch::channel(0);
        Self {
            http_client,
            identity,
            base_url: FIRESTORE_API_BASE.to_string(),
            documents_root: format!(
                "projects/{}/databases/{}/documents",
                config.project_id, config.database_id
            ),
            poll_interval: config.poll_interval,
            retry_policy: RetryPolicy::default(),
            local_writes: Arc::new(local_writes),
        }
    }

    /// Point the connector at another endpoint, e.g. the local emulator
    /// (`http://localhost:8080/v1`).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    fn collection_url(&self, user_id: &str) -> String {
        format!(
            "{}/{}/users/{}/books",
            self.base_url,
            self.documents_root,
            urlencoding::encode(user_id)
        )
    }

    fn document_url(&self, user_id: &str, book_id: &str) -> String {
        format!(
            "{}/{}",
            self.collection_url(user_id),
            urlencoding::encode(book_id)
        )
    }

    fn notify_local_write(&self) {
        self.local_writes.send_modify(|version| *version = version.wrapping_add(1));
    }

    async fn id_token(&self) -> Result<String> {
        self.identity.id_token().await.map_err(|e| match e {
            IdentityError::Network(message) => {
                FirestoreError::BridgeError(BridgeError::ConnectionFailed(message))
            }
            other => FirestoreError::AuthenticationFailed(other.to_string()),
        })
    }

    /// Execute a request with bearer auth and retry logic
    ///
    /// Retries 429, 5xx and connectivity failures with exponential backoff.
    /// A 404 becomes [`FirestoreError::DocumentNotFound`].
    #[instrument(skip(self, body), fields(method = method.as_str(), url = %url))]
    async fn send(
        &self,
        method: HttpMethod,
        url: String,
        body: Option<&Document>,
    ) -> Result<HttpResponse> {
        let token = self.id_token().await?;
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let mut request = HttpRequest::new(method, url.clone())
                .bearer_token(token.as_str())
                .header("Accept", "application/json")
                .timeout(REQUEST_TIMEOUT);
            if let Some(document) = body {
                request = request.json(document)?;
            }

            match self.http_client.execute(request).await {
                Ok(response) if response.is_success() => {
                    debug!(status = response.status, "Firestore request succeeded");
                    return Ok(response);
                }
                Ok(response) if response.status == 429 || response.is_server_error() => {
                    if attempt >= max_attempts {
                        warn!(
                            status = response.status,
                            attempts = attempt,
                            "Firestore request failed after retries"
                        );
                        return Err(api_error(&response));
                    }
                    let delay = self.retry_policy.delay_for(attempt);
                    warn!(
                        status = response.status,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Firestore request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(response) => {
                    return Err(match response.status {
                        401 | 403 => FirestoreError::AuthenticationFailed(error_message(&response)),
                        404 => FirestoreError::DocumentNotFound {
                            path: url.trim_start_matches(&self.base_url).to_string(),
                        },
                        _ => api_error(&response),
                    });
                }
                Err(e) if e.is_connectivity() && attempt < max_attempts => {
                    let delay = self.retry_policy.delay_for(attempt);
                    warn!(
                        error = %e,
                        attempt,
                        max_attempts,
                        "Firestore unreachable, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn fetch_page(
        &self,
        user_id: &str,
        page_token: Option<&str>,
    ) -> Result<ListDocumentsResponse> {
        let mut url = format!("{}?pageSize={}", self.collection_url(user_id), LIST_PAGE_SIZE);
        if let Some(token) = page_token {
            url.push_str("&pageToken=");
            url.push_str(&urlencoding::encode(token));
        }

        let response = self.send(HttpMethod::Get, url, None).await?;
        serde_json::from_slice(&response.body).map_err(|e| FirestoreError::ParseError(e.to_string()))
    }
}

fn error_message(response: &HttpResponse) -> String {
    match serde_json::from_slice::<ErrorResponse>(&response.body) {
        Ok(parsed) if !parsed.error.message.is_empty() => {
            if parsed.error.status.is_empty() {
                parsed.error.message
            } else {
                format!("{}: {}", parsed.error.status, parsed.error.message)
            }
        }
        _ => String::from_utf8_lossy(&response.body).to_string(),
    }
}

fn api_error(response: &HttpResponse) -> FirestoreError {
    FirestoreError::ApiError {
        status_code: response.status,
        message: error_message(response),
    }
}

#[async_trait]
impl CloudBookStore for FirestoreConnector {
    #[instrument(skip(self, document), fields(book_id = %document.id))]
    async fn upsert(&self, user_id: &str, document: CloudBookDocument) -> BridgeResult<()> {
        document
            .validate()
            .map_err(FirestoreError::InvalidDocument)?;

        let body = Document::from_cloud_document(&document);
        self.send(
            HttpMethod::Patch,
            self.document_url(user_id, &document.id),
            Some(&body),
        )
        .await?;

        self.notify_local_write();
        debug!("Book document written");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, user_id: &str, book_id: &str) -> BridgeResult<Option<CloudBookDocument>> {
        let response = match self
            .send(HttpMethod::Get, self.document_url(user_id, book_id), None)
            .await
        {
            Ok(response) => response,
            Err(FirestoreError::DocumentNotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let document: Document = serde_json::from_slice(&response.body)
            .map_err(|e| FirestoreError::ParseError(e.to_string()))?;
        Ok(Some(document.to_cloud_document()?))
    }

    #[instrument(skip(self))]
    async fn delete(&self, user_id: &str, book_id: &str) -> BridgeResult<()> {
        match self
            .send(HttpMethod::Delete, self.document_url(user_id, book_id), None)
            .await
        {
            Ok(_) | Err(FirestoreError::DocumentNotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        self.notify_local_write();
        debug!("Book document deleted");
        Ok(())
    }

    #[instrument(skip(self, update), fields(field = update.field_name()))]
    async fn update_engagement(
        &self,
        user_id: &str,
        book_id: &str,
        update: EngagementUpdate,
    ) -> BridgeResult<()> {
        let value = match &update {
            EngagementUpdate::ReadingProgress(progress) => {
                if *progress > MAX_READING_PROGRESS {
                    return Err(FirestoreError::InvalidDocument(format!(
                        "reading progress {} exceeds {}",
                        progress, MAX_READING_PROGRESS
                    ))
                    .into());
                }
                Value::integer(*progress)
            }
            EngagementUpdate::Liked(liked) => Value::Boolean(*liked),
            EngagementUpdate::Notes(notes) => Value::string(notes.as_str()),
        };

        let field = update.field_name();
        let mut body = Document::default();
        body.fields.insert(field.to_string(), value);

        let url = format!(
            "{}?updateMask.fieldPaths={}&currentDocument.exists=true",
            self.document_url(user_id, book_id),
            field
        );
        self.send(HttpMethod::Patch, url, Some(&body)).await?;

        self.notify_local_write();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list(&self, user_id: &str) -> BridgeResult<Vec<CloudBookDocument>> {
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self.fetch_page(user_id, page_token.as_deref()).await?;

            for document in page.documents {
                match document.to_cloud_document() {
                    Ok(decoded) => documents.push(decoded),
                    Err(e) => warn!(name = %document.name, error = %e, "Skipping malformed document"),
                }
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(count = documents.len(), "Listed book documents");
        Ok(documents)
    }

    #[instrument(skip(self))]
    async fn watch_collection(&self, user_id: &str) -> BridgeResult<SnapshotStream> {
        let initial = self.list(user_id).await?;

        let (sender, receiver) = mpsc::channel(SNAPSHOT_BUFFER);
        let token = CancellationToken::new();
        let connector = self.clone();
        let user_id = user_id.to_string();
        let cancelled = token.clone();

        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Starting book collection listener"
        );

        tokio::spawn(async move {
            let mut writes = connector.local_writes.subscribe();
            writes.borrow_and_update();

            let mut last = initial;
            if sender.send(Ok(last.clone())).await.is_err() {
                return;
            }

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = sender.closed() => break,
                    _ = tokio::time::sleep(connector.poll_interval) => {}
                    changed = writes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }

                match connector.list(&user_id).await {
                    Ok(snapshot) if snapshot == last => {}
                    Ok(snapshot) => {
                        last = snapshot.clone();
                        if sender.send(Ok(snapshot)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Book collection poll failed");
                        if sender.send(Err(e)).await.is_err() {
                            break;
                        }
                    }
                }
            }

            debug!("Book collection listener stopped");
        });

        Ok(Box::pin(PollingSnapshots {
            receiver,
            _guard: token.drop_guard(),
        }))
    }
}

/// Snapshot stream backed by the polling task; dropping it stops the task.
struct PollingSnapshots {
    receiver: mpsc::Receiver<BridgeResult<Vec<CloudBookDocument>>>,
    _guard: DropGuard,
}

impl Stream for PollingSnapshots {
    type Item = BridgeResult<Vec<CloudBookDocument>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::identity::AuthUser;
    use futures::StreamExt;
    use mockall::mock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    struct StubIdentity {
        signed_in: bool,
    }

    #[async_trait]
    impl IdentityProvider for StubIdentity {
        fn current_user(&self) -> Option<AuthUser> {
            self.signed_in.then(|| AuthUser::new("u1"))
        }

        async fn id_token(&self) -> std::result::Result<String, IdentityError> {
            if self.signed_in {
                Ok("id-token".to_string())
            } else {
                Err(IdentityError::NotSignedIn)
            }
        }

        async fn sign_in(
            &self,
            _email: &str,
            _password: &str,
        ) -> std::result::Result<AuthUser, IdentityError> {
            Err(IdentityError::InvalidCredentials)
        }

        async fn register(
            &self,
            _email: &str,
            _password: &str,
        ) -> std::result::Result<AuthUser, IdentityError> {
            Err(IdentityError::InvalidCredentials)
        }

        async fn sign_out(&self) -> std::result::Result<(), IdentityError> {
            Ok(())
        }

        async fn send_password_reset(&self, _email: &str) -> std::result::Result<(), IdentityError> {
            Ok(())
        }
    }

    const DOC_ROOT: &str =
        "https://firestore.googleapis.com/v1/projects/demo/databases/(default)/documents";

    fn connector(http: MockHttpClient) -> FirestoreConnector {
        connector_with_identity(http, true)
    }

    fn connector_with_identity(http: MockHttpClient, signed_in: bool) -> FirestoreConnector {
        let config = FirestoreConfig::new("demo").with_poll_interval(Duration::from_secs(3600));
        FirestoreConnector::new(Arc::new(http), Arc::new(StubIdentity { signed_in }), &config)
            .with_retry_policy(RetryPolicy {
                base_delay: Duration::from_millis(1),
                ..RetryPolicy::default()
            })
    }

    fn book_json(id: &str, title: &str) -> String {
        format!(
            r#"{{
                "name": "projects/demo/databases/(default)/documents/users/u1/books/{id}",
                "fields": {{
                    "id": {{"stringValue": "{id}"}},
                    "title": {{"stringValue": "{title}"}},
                    "author": {{"stringValue": "Author"}},
                    "readingStatus": {{"stringValue": "READING"}},
                    "readingProgress": {{"integerValue": "40"}}
                }}
            }}"#
        )
    }

    fn document(id: &str) -> CloudBookDocument {
        CloudBookDocument {
            id: id.to_string(),
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            description: String::new(),
            thumbnail_url: String::new(),
            published_date: String::new(),
            page_count: 412,
            categories: vec![],
            reading_status: "NONE".to_string(),
            saved_date: 1,
            is_liked: false,
            reading_progress: 0,
            notes: String::new(),
        }
    }

    #[tokio::test]
    async fn test_upsert_patches_document() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .withf(|req| {
                let body: serde_json::Value =
                    serde_json::from_slice(req.body.as_deref().unwrap_or_default()).unwrap();
                req.method == HttpMethod::Patch
                    && req.url == format!("{DOC_ROOT}/users/u1/books/b1")
                    && req.headers.get("Authorization").map(String::as_str)
                        == Some("Bearer id-token")
                    && body["fields"]["pageCount"]["integerValue"] == "412"
            })
            .returning(|_| Ok(HttpResponse::new(200, "{}")));

        connector(mock_http).upsert("u1", document("b1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_upsert_rejects_invalid_document() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(0);

        let mut invalid = document("b1");
        invalid.reading_progress = 101;
        let err = connector(mock_http).upsert("u1", invalid).await.unwrap_err();
        assert!(matches!(err, BridgeError::OperationFailed(_)));
    }

    #[tokio::test]
    async fn test_get_returns_none_on_404() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|_| {
            Ok(HttpResponse::new(
                404,
                r#"{"error":{"code":404,"message":"Document not found","status":"NOT_FOUND"}}"#,
            ))
        });

        let result = connector(mock_http).get("u1", "missing").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_get_decodes_document() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(HttpResponse::new(200, book_json("b1", "Dune"))));

        let found = connector(mock_http).get("u1", "b1").await.unwrap().unwrap();
        assert_eq!(found.id, "b1");
        assert_eq!(found.reading_status, "READING");
        assert_eq!(found.reading_progress, 40);
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_document() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .withf(|req| req.method == HttpMethod::Delete)
            .returning(|_| Ok(HttpResponse::new(404, "")));

        connector(mock_http).delete("u1", "gone").await.unwrap();
    }

    #[tokio::test]
    async fn test_engagement_update_uses_field_mask() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .withf(|req| {
                let body: serde_json::Value =
                    serde_json::from_slice(req.body.as_deref().unwrap_or_default()).unwrap();
                req.url.ends_with("/books/b1?updateMask.fieldPaths=isLiked&currentDocument.exists=true")
                    && body["fields"]["isLiked"]["booleanValue"] == true
                    && body["fields"].as_object().map(|f| f.len()) == Some(1)
            })
            .returning(|_| Ok(HttpResponse::new(200, "{}")));

        connector(mock_http)
            .update_engagement("u1", "b1", EngagementUpdate::Liked(true))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_list_follows_page_tokens() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(2)
            .returning(|req| {
                if req.url.contains("pageToken=next") {
                    Ok(HttpResponse::new(
                        200,
                        format!(r#"{{"documents":[{}]}}"#, book_json("b2", "Emma")),
                    ))
                } else {
                    Ok(HttpResponse::new(
                        200,
                        format!(
                            r#"{{"documents":[{}],"nextPageToken":"next"}}"#,
                            book_json("b1", "Dune")
                        ),
                    ))
                }
            });

        let books = connector(mock_http).list("u1").await.unwrap();
        let ids: Vec<_> = books.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["b1", "b2"]);
    }

    #[tokio::test]
    async fn test_empty_collection() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(HttpResponse::new(200, "{}")));

        assert!(connector(mock_http).list("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_permission_denied_maps_to_unauthenticated() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|_| {
            Ok(HttpResponse::new(
                403,
                r#"{"error":{"code":403,"message":"Missing or insufficient permissions.","status":"PERMISSION_DENIED"}}"#,
            ))
        });

        let err = connector(mock_http).list("u1").await.unwrap_err();
        assert!(matches!(err, BridgeError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn test_signed_out_makes_no_request() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(0);

        let err = connector_with_identity(mock_http, false)
            .list("u1")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(2).returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(HttpResponse::new(503, "unavailable"))
            } else {
                Ok(HttpResponse::new(200, "{}"))
            }
        });

        connector(mock_http).list("u1").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_connectivity_error_surfaces_after_retries() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(3)
            .returning(|_| Err(BridgeError::ConnectionFailed("offline".to_string())));

        let err = connector(mock_http).list("u1").await.unwrap_err();
        assert!(err.is_connectivity());
    }

    #[tokio::test]
    async fn test_watch_emits_initial_and_changed_snapshots() {
        let lists = Arc::new(AtomicUsize::new(0));
        let counter = lists.clone();

        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().returning(move |req| {
            if req.method == HttpMethod::Patch {
                return Ok(HttpResponse::new(200, "{}"));
            }
            let body = if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                r#"{}"#.to_string()
            } else {
                format!(r#"{{"documents":[{}]}}"#, book_json("b1", "Dune"))
            };
            Ok(HttpResponse::new(200, body))
        });

        let connector = connector(mock_http);
        let mut stream = connector.watch_collection("u1").await.unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert!(first.is_empty());

        connector.upsert("u1", document("b1")).await.unwrap();

        let second = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, "b1");
    }

    #[tokio::test]
    async fn test_watch_fails_when_first_list_fails() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(HttpResponse::new(401, "")));

        let result = connector(mock_http).watch_collection("u1").await;
        assert!(matches!(result, Err(BridgeError::Unauthenticated(_))));
    }
}
