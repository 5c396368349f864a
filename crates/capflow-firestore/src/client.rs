//! Firestore REST API client.
//!
//! - Token caching with refresh margin, one re-auth on expired tokens
//! - HTTP client tuning (pooling, timeouts)
//! - Update-time preconditions for compare-and-set writes
//! - Atomic multi-document commits
//! - Tracing spans and request metrics

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::{Client, Method, Response, StatusCode};
use tracing::{debug, info, info_span, Instrument};

use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_request;
use crate::retry::RetryConfig;
use crate::token_cache::{TokenCache, TokenSource};
use crate::types::{
    CommitRequest, CommitResponse, Cursor, Document, RunQueryRequest, RunQueryResponse, StructuredQuery, Value,
    Write,
};

/// Firestore's limit on writes per commit.
pub const MAX_COMMIT_WRITES: usize = 500;

/// Firestore client configuration.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    pub project_id: String,
    /// Database ID (usually "(default)")
    pub database_id: String,
    /// Emulator address (`host:port`); disables service-account auth
    pub emulator_host: Option<String>,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryConfig,
}

impl FirestoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> FirestoreResult<Self> {
        let project_id = std::env::var("GCP_PROJECT_ID")
            .or_else(|_| std::env::var("FIREBASE_PROJECT_ID"))
            .map_err(|_| FirestoreError::auth_error("GCP_PROJECT_ID or FIREBASE_PROJECT_ID must be set"))?;

        if project_id.is_empty() {
            return Err(FirestoreError::auth_error(
                "GCP_PROJECT_ID or FIREBASE_PROJECT_ID cannot be empty",
            ));
        }

        let connect_timeout_secs: u64 = std::env::var("FIRESTORE_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Ok(Self {
            project_id,
            database_id: std::env::var("FIRESTORE_DATABASE_ID").unwrap_or_else(|_| "(default)".to_string()),
            emulator_host: std::env::var("FIRESTORE_EMULATOR_HOST").ok().filter(|h| !h.is_empty()),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            retry: RetryConfig::from_env(),
        })
    }

    /// Config pointed at an emulator.
    pub fn emulator(project_id: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database_id: "(default)".to_string(),
            emulator_host: Some(host.into()),
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(2),
            retry: RetryConfig::default(),
        }
    }

    fn documents_root(&self) -> String {
        let origin = match &self.emulator_host {
            Some(host) if host.starts_with("http://") || host.starts_with("https://") => host.clone(),
            Some(host) => format!("http://{}", host),
            None => "https://firestore.googleapis.com".to_string(),
        };
        format!(
            "{}/v1/projects/{}/databases/{}/documents",
            origin, self.project_id, self.database_id
        )
    }
}

/// Firestore REST API client.
#[derive(Clone)]
pub struct FirestoreClient {
    http: Client,
    config: FirestoreConfig,
    base_url: String,
    token_cache: Arc<TokenCache>,
}

impl FirestoreClient {
    pub async fn new(config: FirestoreConfig) -> FirestoreResult<Self> {
        let source = match &config.emulator_host {
            Some(host) => {
                info!(host = %host, "Using Firestore emulator");
                TokenSource::Static("owner".to_string())
            }
            None => TokenSource::Provider(Self::create_auth_provider()?),
        };

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("capflow-firestore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FirestoreError::Network)?;

        Ok(Self {
            http,
            base_url: config.documents_root(),
            config,
            token_cache: Arc::new(TokenCache::new(source)),
        })
    }

    fn create_auth_provider() -> FirestoreResult<Arc<dyn TokenProvider>> {
        let service_account = CustomServiceAccount::from_env()
            .map_err(|e| FirestoreError::auth_error(format!("Failed to load service account: {}", e)))?;

        match service_account {
            Some(sa) => Ok(Arc::new(sa)),
            None => Err(FirestoreError::auth_error(
                "GOOGLE_APPLICATION_CREDENTIALS not set. \
                 Set it to the path of your service account JSON file.",
            )),
        }
    }

    pub async fn from_env() -> FirestoreResult<Self> {
        Self::new(FirestoreConfig::from_env()?).await
    }

    pub fn config(&self) -> &FirestoreConfig {
        &self.config
    }

    /// Full resource name, as used inside commits.
    pub fn full_document_name(&self, collection: &str, doc_id: &str) -> String {
        format!(
            "projects/{}/databases/{}/documents/{}/{}",
            self.config.project_id, self.config.database_id, collection, doc_id
        )
    }

    fn document_url(&self, collection: &str, doc_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection, urlencoding::encode(doc_id))
    }

    // =========================================================================
    // Document operations
    // =========================================================================

    pub async fn get_document(&self, collection: &str, doc_id: &str) -> FirestoreResult<Option<Document>> {
        let url = self.document_url(collection, doc_id);

        self.execute_request("get_document", collection, Some(doc_id), async {
            let response = self.send(Method::GET, &url, None).await?;
            match response.status() {
                StatusCode::OK => Ok(Some(response.json().await?)),
                StatusCode::NOT_FOUND => Ok(None),
                status => Err(Self::error_from(status, &url, response).await),
            }
        })
        .await
    }

    /// Create a document; fails with `AlreadyExists` if the id is taken.
    pub async fn create_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> FirestoreResult<Document> {
        let url = format!(
            "{}/{}?documentId={}",
            self.base_url,
            collection,
            urlencoding::encode(doc_id)
        );
        let body = serde_json::to_value(Document::new(fields))?;

        self.execute_request("create_document", collection, Some(doc_id), async {
            let response = self.send(Method::POST, &url, Some(&body)).await?;
            match response.status() {
                StatusCode::OK | StatusCode::CREATED => Ok(response.json().await?),
                StatusCode::CONFLICT => Err(FirestoreError::AlreadyExists(format!("{}/{}", collection, doc_id))),
                status => Err(Self::error_from(status, &url, response).await),
            }
        })
        .await
    }

    /// Patch a document, creating it when absent and no precondition is set.
    ///
    /// With `update_time`, the write only applies if the stored document
    /// still carries that update time; otherwise `PreconditionFailed`.
    pub async fn update_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        update_mask: Option<&[&str]>,
        update_time: Option<&str>,
    ) -> FirestoreResult<Document> {
        let mut params: Vec<String> = Vec::new();
        if let Some(mask) = update_mask {
            params.extend(mask.iter().map(|f| format!("updateMask.fieldPaths={}", f)));
        }
        if let Some(ts) = update_time {
            params.push(format!("currentDocument.updateTime={}", urlencoding::encode(ts)));
        }
        let mut url = self.document_url(collection, doc_id);
        if !params.is_empty() {
            url = format!("{}?{}", url, params.join("&"));
        }
        let body = serde_json::to_value(Document::new(fields))?;
        let operation = if update_time.is_some() {
            "update_document_precondition"
        } else {
            "update_document"
        };

        self.execute_request(operation, collection, Some(doc_id), async {
            let response = self.send(Method::PATCH, &url, Some(&body)).await?;
            match response.status() {
                StatusCode::OK => Ok(response.json().await?),
                StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT => {
                    let text = response.text().await.unwrap_or_default();
                    Err(FirestoreError::PreconditionFailed(format!("{}/{}: {}", collection, doc_id, text)))
                }
                StatusCode::NOT_FOUND => Err(FirestoreError::not_found(format!("{}/{}", collection, doc_id))),
                status => Err(Self::error_from(status, &url, response).await),
            }
        })
        .await
    }

    /// Delete a document; returns false if it did not exist.
    pub async fn delete_document(&self, collection: &str, doc_id: &str) -> FirestoreResult<bool> {
        let url = format!("{}?currentDocument.exists=true", self.document_url(collection, doc_id));

        self.execute_request("delete_document", collection, Some(doc_id), async {
            let response = self.send(Method::DELETE, &url, None).await?;
            match response.status() {
                StatusCode::OK | StatusCode::NO_CONTENT => Ok(true),
                StatusCode::NOT_FOUND => {
                    debug!("Document {}/{} already deleted", collection, doc_id);
                    Ok(false)
                }
                status => {
                    let err = Self::error_from(status, &url, response).await;
                    // A missing document fails the exists precondition
                    if matches!(err, FirestoreError::NotFound(_)) || err.is_precondition_failed() {
                        Ok(false)
                    } else {
                        Err(err)
                    }
                }
            }
        })
        .await
    }

    // =========================================================================
    // Queries and commits
    // =========================================================================

    /// Run a structured query.
    ///
    /// `parent_path` is the document containing the collection (e.g.
    /// `users/USER_ID`), or empty for a root collection.
    pub async fn run_query(&self, parent_path: &str, query: StructuredQuery) -> FirestoreResult<Vec<Document>> {
        let url = if parent_path.is_empty() {
            format!("{}:runQuery", self.base_url)
        } else {
            format!("{}/{}:runQuery", self.base_url, parent_path)
        };
        let collection = query
            .from
            .first()
            .map(|c| c.collection_id.clone())
            .unwrap_or_default();
        let body = serde_json::to_value(RunQueryRequest {
            structured_query: query,
        })?;

        self.execute_request("run_query", &collection, None, async {
            let response = self.send(Method::POST, &url, Some(&body)).await?;
            match response.status() {
                StatusCode::OK => {
                    let text = response.text().await.unwrap_or_default();
                    let responses: Vec<RunQueryResponse> = serde_json::from_str(&text).map_err(|e| {
                        FirestoreError::invalid_response(format!(
                            "runQuery: {} (body prefix: {})",
                            e,
                            text.chars().take(200).collect::<String>()
                        ))
                    })?;
                    Ok(responses.into_iter().filter_map(|r| r.document).collect())
                }
                status => Err(Self::error_from(status, &url, response).await),
            }
        })
        .await
    }

    /// Run a query to completion, `page_size` documents per request.
    ///
    /// Pages are chained with a `startAt` cursor on the query's order
    /// fields followed by the document name, so a result set larger than
    /// one page is never cut short.
    pub async fn run_query_paged(
        &self,
        parent_path: &str,
        query: StructuredQuery,
        page_size: i32,
    ) -> FirestoreResult<Vec<Document>> {
        let page_size = page_size.max(1);
        let query = query.paged(page_size);
        let mut documents = Vec::new();
        let mut cursor: Option<Cursor> = None;

        loop {
            let mut page_query = query.clone();
            page_query.start_at = cursor.take();
            let page = self
                .with_retry("run_query", || self.run_query(parent_path, page_query.clone()))
                .await?;

            if page.len() as i32 >= page_size {
                cursor = page.last().map(|doc| query.cursor_after(doc));
            }
            documents.extend(page);
            if cursor.is_none() {
                break;
            }
            debug!(fetched = documents.len(), "Fetching next query page");
        }

        Ok(documents)
    }

    /// Apply writes atomically: all succeed or none do.
    pub async fn commit(&self, writes: Vec<Write>) -> FirestoreResult<CommitResponse> {
        if writes.is_empty() {
            return Ok(CommitResponse {
                write_results: Some(vec![]),
                commit_time: None,
            });
        }
        if writes.len() > MAX_COMMIT_WRITES {
            return Err(FirestoreError::request_failed(format!(
                "Commit exceeds {} write limit",
                MAX_COMMIT_WRITES
            )));
        }

        let url = format!("{}:commit", self.base_url);
        let body = serde_json::to_value(CommitRequest { writes })?;

        self.execute_request("commit", "batch", None, async {
            let response = self.send(Method::POST, &url, Some(&body)).await?;
            match response.status() {
                StatusCode::OK => Ok(response.json().await?),
                StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => {
                    let text = response.text().await.unwrap_or_default();
                    Err(FirestoreError::PreconditionFailed(format!("commit: {}", text)))
                }
                status => Err(Self::error_from(status, &url, response).await),
            }
        })
        .await
    }

    /// Run `op` under the configured retry policy.
    pub async fn with_retry<T, F, Fut>(&self, operation: &str, op: F) -> FirestoreResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = FirestoreResult<T>>,
    {
        crate::retry::with_retry(&self.config.retry, operation, op).await
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    /// Send an authorized request, re-authenticating once on an expired token.
    async fn send(&self, method: Method, url: &str, body: Option<&serde_json::Value>) -> FirestoreResult<Response> {
        let token = self.token_cache.get_token().await?;
        let response = self.build(method.clone(), url, body, &token).send().await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        if !(text.contains("ACCESS_TOKEN_EXPIRED") || text.contains("\"UNAUTHENTICATED\"")) {
            return Err(FirestoreError::auth_error(format!("{} failed: {}", url, text)));
        }

        self.token_cache.invalidate().await;
        let token = self.token_cache.get_token().await?;
        Ok(self.build(method, url, body, &token).send().await?)
    }

    fn build(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
        token: &str,
    ) -> reqwest::RequestBuilder {
        let request = self.http.request(method, url).bearer_auth(token);
        match body {
            Some(json) => request.json(json),
            None => request,
        }
    }

    async fn execute_request<T, F>(
        &self,
        operation: &str,
        collection: &str,
        doc_id: Option<&str>,
        fut: F,
    ) -> FirestoreResult<T>
    where
        F: std::future::Future<Output = FirestoreResult<T>>,
    {
        let span = info_span!(
            "firestore_request",
            operation = %operation,
            collection = %collection,
            doc_id = doc_id.unwrap_or("")
        );

        let start = Instant::now();
        let result = fut.instrument(span).await;
        let latency_ms = start.elapsed().as_millis() as f64;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request(operation, status, latency_ms);

        result
    }

    async fn error_from(status: StatusCode, url: &str, response: Response) -> FirestoreError {
        let body = response.text().await.unwrap_or_default();
        FirestoreError::from_http_status(status.as_u16(), format!("{} failed: {}", url, body))
    }
}
