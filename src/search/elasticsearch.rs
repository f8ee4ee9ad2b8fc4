//! Elasticsearch transport for the paging core
//!
//! Speaks the plain REST API over `reqwest`: `_search` with `search_after`,
//! `from`/`size`, or `scroll`, plus `_search/scroll` continuation and
//! cleanup. Credentials and TLS trust come from [`BackendConfig`] and never
//! leak into the paging logic.

use crate::config::BackendConfig;
use crate::error::{AppError, Result};
use crate::search::backend::{
    BackendPage, BackendRequest, PagePosition, PagingStrategy, ResultRecord, SearchBackend,
};
use crate::search::cursor::NativeCursor;
use crate::search::error::{SearchError, SearchResult};
use crate::search::query::{QueryDescriptor, QueryMode};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

const FILE_NAME_FIELD: &str = "file_name";
const LINE_NUMBER_FIELD: &str = "line_number";
const UNKNOWN_FILE: &str = "unknown";

/// Elasticsearch backed [`SearchBackend`]
#[derive(Clone)]
pub struct ElasticsearchBackend {
    client: Client,
    base_url: String,
    index: String,
    username: Option<String>,
    password: Option<String>,
    content_field: String,
    exact_field: String,
    sort_fields: Vec<String>,
    scroll_keep_alive: String,
    max_result_window: u64,
}

#[derive(Debug, Deserialize)]
struct SearchResponseBody {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    hits: HitsBody,
}

#[derive(Debug, Deserialize)]
struct HitsBody {
    total: Option<TotalBody>,
    #[serde(default)]
    hits: Vec<HitBody>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TotalBody {
    Count(u64),
    Object { value: u64 },
}

#[derive(Debug, Deserialize)]
struct HitBody {
    #[serde(rename = "_source", default)]
    source: Map<String, Value>,
    sort: Option<Value>,
}

impl ElasticsearchBackend {
    /// Create a new transport from configuration
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("line-search/", env!("CARGO_PKG_VERSION")));

        if !config.verify_tls {
            warn!(url = %config.url, "TLS certificate verification disabled for search backend");
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(path) = &config.ca_cert {
            let pem = std::fs::read(path)?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                AppError::Configuration(format!("Invalid CA certificate {}: {}", path.display(), e))
            })?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        let password = match &config.password_env {
            Some(var) => Some(std::env::var(var).map_err(|_| {
                AppError::Configuration(format!("Backend password variable {} is not set", var))
            })?),
            None => None,
        };

        if config.sort_fields.is_empty() {
            return Err(AppError::Configuration(
                "backend.sort_fields must name at least one field".to_string(),
            ));
        }

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            index: config.index.clone(),
            username: config.username.clone(),
            password,
            content_field: config.content_field.clone(),
            exact_field: config.exact_field.clone(),
            sort_fields: config.sort_fields.clone(),
            scroll_keep_alive: config.scroll_keep_alive.clone(),
            max_result_window: config.max_result_window,
        })
    }

    /// Native query clause for a descriptor
    pub fn query_clause(&self, query: &QueryDescriptor) -> Value {
        let case_insensitive = !query.case_sensitive();
        match query.mode() {
            QueryMode::Substring => json!({
                "wildcard": {
                    self.content_field.as_str(): {
                        "value": query.pattern(),
                        "case_insensitive": case_insensitive,
                    }
                }
            }),
            QueryMode::ExactMatch => json!({
                "term": {
                    self.exact_field.as_str(): {
                        "value": query.pattern(),
                        "case_insensitive": case_insensitive,
                    }
                }
            }),
        }
    }

    fn sort_clause(&self) -> Value {
        Value::Array(
            self.sort_fields
                .iter()
                .map(|field| json!({ field.as_str(): "asc" }))
                .collect(),
        )
    }

    fn source_fields(&self) -> Value {
        json!([self.content_field, FILE_NAME_FIELD, LINE_NUMBER_FIELD])
    }

    /// Path (relative to the base URL) and body for one request
    pub fn request_parts(&self, request: &BackendRequest) -> SearchResult<(String, Value)> {
        let search_path = format!("/{}/_search", self.index);

        match (&request.strategy, &request.position) {
            (PagingStrategy::Scroll, PagePosition::Start) => Ok((
                format!("{}?scroll={}", search_path, self.scroll_keep_alive),
                json!({
                    "query": self.query_clause(&request.query),
                    "size": request.size,
                    "sort": ["_doc"],
                    "track_total_hits": true,
                    "_source": self.source_fields(),
                }),
            )),
            (PagingStrategy::Scroll, PagePosition::After(NativeCursor::Scroll(id))) => Ok((
                "/_search/scroll".to_string(),
                json!({
                    "scroll": self.scroll_keep_alive,
                    "scroll_id": id,
                }),
            )),
            (PagingStrategy::SearchAfter, PagePosition::Start) => Ok((
                search_path,
                json!({
                    "query": self.query_clause(&request.query),
                    "size": request.size,
                    "sort": self.sort_clause(),
                    "track_total_hits": true,
                    "_source": self.source_fields(),
                }),
            )),
            (
                PagingStrategy::SearchAfter,
                PagePosition::After(cursor @ NativeCursor::SearchAfter(_)),
            ) => Ok((
                search_path,
                json!({
                    "query": self.query_clause(&request.query),
                    "size": request.size,
                    "sort": self.sort_clause(),
                    "search_after": cursor.to_backend(),
                    "track_total_hits": true,
                    "_source": self.source_fields(),
                }),
            )),
            (PagingStrategy::Offset, PagePosition::Offset(from)) => Ok((
                search_path,
                json!({
                    "query": self.query_clause(&request.query),
                    "from": from,
                    "size": request.size,
                    "sort": self.sort_clause(),
                    "track_total_hits": true,
                    "_source": self.source_fields(),
                }),
            )),
            (strategy, position) => Err(SearchError::MalformedCursor(format!(
                "{:?} cannot be used with {} paging",
                position, strategy
            ))),
        }
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.username {
            Some(user) => builder.basic_auth(user, self.password.as_deref()),
            None => builder,
        }
    }

    async fn send(&self, method: Method, path: &str, body: &Value) -> SearchResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .authorize(self.client.request(method, &url))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                SearchError::BackendUnavailable(format!("response body timed out: {}", e))
            } else {
                SearchError::BackendUnavailable(format!("failed to read response body: {}", e))
            }
        })?;

        if !status.is_success() {
            return Err(classify_status(status, path, &text));
        }

        serde_json::from_str(&text).map_err(|e| {
            SearchError::ProtocolViolation(format!("invalid JSON from backend: {}", e))
        })
    }

    /// Convert a raw `_search` response into a page
    pub fn parse_page(&self, strategy: PagingStrategy, body: Value) -> SearchResult<BackendPage> {
        let parsed: SearchResponseBody = serde_json::from_value(body).map_err(|e| {
            SearchError::ProtocolViolation(format!("unexpected search response: {}", e))
        })?;

        let total = match parsed.hits.total {
            Some(TotalBody::Count(count)) | Some(TotalBody::Object { value: count }) => count,
            None => {
                return Err(SearchError::ProtocolViolation(
                    "response is missing hits.total".to_string(),
                ))
            }
        };

        let last_sort = parsed.hits.hits.last().and_then(|hit| hit.sort.clone());

        let records = parsed
            .hits
            .hits
            .into_iter()
            .map(|hit| self.record_from_source(hit.source))
            .collect::<SearchResult<Vec<_>>>()?;

        let continuation = match strategy {
            PagingStrategy::Scroll => parsed
                .scroll_id
                .map(|id| NativeCursor::from_backend(Value::String(id)))
                .transpose()?,
            PagingStrategy::SearchAfter => last_sort.map(NativeCursor::from_backend).transpose()?,
            PagingStrategy::Offset => None,
        };

        Ok(BackendPage {
            records,
            total,
            continuation,
        })
    }

    fn record_from_source(&self, mut source: Map<String, Value>) -> SearchResult<ResultRecord> {
        let content = match source.remove(&self.content_field) {
            Some(Value::String(content)) => content,
            _ => {
                return Err(SearchError::ProtocolViolation(format!(
                    "hit without a string '{}' field",
                    self.content_field
                )))
            }
        };

        let source_file = match source.remove(FILE_NAME_FIELD) {
            Some(Value::String(name)) if !name.is_empty() => name,
            _ => UNKNOWN_FILE.to_string(),
        };

        let line_number = match source.remove(LINE_NUMBER_FIELD) {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
            _ => None,
        }
        .filter(|n| *n >= 1)
        .ok_or_else(|| {
            SearchError::ProtocolViolation(format!(
                "hit in '{}' without a positive line_number",
                source_file
            ))
        })?;

        Ok(ResultRecord {
            content,
            source_file,
            line_number,
        })
    }
}

fn classify_status(status: StatusCode, path: &str, body: &str) -> SearchError {
    let snippet: String = body.chars().take(300).collect();

    if status == StatusCode::NOT_FOUND && path.starts_with("/_search/scroll") {
        return SearchError::MalformedCursor(format!("scroll context expired: {}", snippet));
    }

    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
    {
        return SearchError::BackendUnavailable(format!("backend returned {}: {}", status, snippet));
    }

    SearchError::ProtocolViolation(format!("backend rejected request ({}): {}", status, snippet))
}

#[async_trait]
impl SearchBackend for ElasticsearchBackend {
    fn name(&self) -> &str {
        "elasticsearch"
    }

    fn max_result_window(&self) -> u64 {
        self.max_result_window
    }

    async fn search(&self, request: &BackendRequest) -> SearchResult<BackendPage> {
        let (path, body) = self.request_parts(request)?;
        debug!(
            path = %path,
            strategy = %request.strategy,
            size = request.size,
            "Dispatching search request"
        );

        let response = self.send(Method::POST, &path, &body).await?;
        self.parse_page(request.strategy, response)
    }

    async fn ping(&self) -> bool {
        let url = format!("{}/", self.base_url);
        match self.authorize(self.client.get(&url)).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Backend ping failed");
                false
            }
        }
    }

    async fn release(&self, cursor: &NativeCursor) -> SearchResult<()> {
        if let NativeCursor::Scroll(id) = cursor {
            self.send(Method::DELETE, "/_search/scroll", &json!({ "scroll_id": id }))
                .await?;
            debug!("Scroll context released");
        }
        Ok(())
    }
}
