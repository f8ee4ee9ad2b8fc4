use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::metrics;
use crate::search::{
    normalize_with_case, Cursor, ExportFormat, Navigation, PagingMode, QueryDescriptor,
    QueryMode, ResultRecord, SearchSession, StoreSnapshot, StoreState, EXPORT_FILE_NAME,
};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Liveness probe: the process is up
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "alive".to_string(),
        backend: None,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Health check: 200 when the backend answers a ping, 503 otherwise
pub async fn health_check(State(state): State<AppState>) -> Response {
    let up = state.backend.ping().await;
    metrics::BACKEND_UP.set(if up { 1.0 } else { 0.0 });

    let body = Json(HealthResponse {
        status: if up { "healthy" } else { "unhealthy" }.to_string(),
        backend: Some(state.backend.name().to_string()),
        version: env!("CARGO_PKG_VERSION").to_string(),
    });

    if up {
        (StatusCode::OK, body).into_response()
    } else {
        tracing::warn!(backend = state.backend.name(), "Health check: backend unreachable");
        (StatusCode::SERVICE_UNAVAILABLE, body).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    pub version: String,
}

/// Prometheus scrape endpoint
pub async fn metrics_endpoint() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}

/// Fetch one page, by cursor (or from the start) or by page number
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>> {
    params.validate()?;
    let query = normalize_with_case(&params.q, params.mode, params.case_sensitive)?;
    let page_size = params.page_size.unwrap_or_else(|| state.default_page_size());

    let mut page = match (params.cursor.as_deref(), params.page) {
        (Some(_), Some(_)) => {
            return Err(AppError::Validation(
                "cursor and page cannot be combined".to_string(),
            ))
        }
        (None, Some(page_number)) => state.walker.page(&query, page_number, page_size).await?,
        (token, None) => {
            let cursor = token.map(Cursor::parse).transpose()?;
            state.fetcher.fetch(&query, cursor.as_ref(), page_size).await?
        }
    };

    if let Some(native) = page.release.take() {
        let fetcher = state.fetcher.clone();
        tokio::spawn(async move { fetcher.release_native(&native).await });
    }

    Ok(Json(SearchResponse {
        total_results: page.total_results,
        next_cursor: page.next_cursor.as_ref().map(Cursor::token),
        exhausted: page.exhausted,
        page: params.page,
        results: page.items,
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SearchParams {
    #[validate(length(max = 4096))]
    pub q: String,
    pub cursor: Option<String>,
    #[validate(range(min = 1))]
    pub page: Option<u64>,
    pub page_size: Option<usize>,
    #[serde(default)]
    pub mode: QueryMode,
    #[serde(default)]
    pub case_sensitive: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<ResultRecord>,
    pub total_results: u64,
    pub next_cursor: Option<String>,
    pub exhausted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
}

/// Materialize every match and return it as a text download
pub async fn export(
    State(state): State<AppState>,
    Query(params): Query<ExportParams>,
) -> Result<Response> {
    params.validate()?;
    let query = normalize_with_case(&params.q, params.mode, params.case_sensitive)?;

    let materialized = state
        .walker
        .materialize(&query)
        .await
        .map_err(|e| AppError::from(e.source))?;

    if materialized.truncated {
        tracing::warn!(
            query = query.raw_text(),
            exported = materialized.records.len(),
            total_results = materialized.total_results,
            "Export truncated at the result cap"
        );
    }

    Ok(text_download(
        crate::search::export::render(&materialized.records, params.format),
        materialized.truncated,
    ))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ExportParams {
    #[validate(length(max = 4096))]
    pub q: String,
    #[serde(default)]
    pub mode: QueryMode,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub format: ExportFormat,
}

/// Open an interactive session
pub async fn create_session(
    State(state): State<AppState>,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<(StatusCode, Json<SessionCreated>)> {
    let page_size = body.and_then(|Json(request)| request.page_size);
    let session = state.sessions.create(page_size).await?;

    Ok((
        StatusCode::CREATED,
        Json(SessionCreated {
            session_id: session.id(),
            page_size: session.with_store(|store| store.page_size()),
        }),
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    pub page_size: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionCreated {
    pub session_id: Uuid,
    pub page_size: usize,
}

/// Submit a query to a session and wait for its first results
pub async fn session_search(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SessionSearchRequest>,
) -> Result<Json<StoreSnapshot>> {
    request.validate()?;
    let session = find_session(&state, &id).await?;
    let query = normalize_with_case(&request.q, request.mode, request.case_sensitive)?;

    let handle = session.submit(query.clone(), request.paging);
    if let Err(e) = handle.await {
        // Cancelled by a newer submission to the same session
        tracing::debug!(session = %id, error = %e, "Fetch task did not complete");
    }

    if let Some(err) = failed_submission(&session, &query) {
        return Err(err.into());
    }
    Ok(Json(session.snapshot()))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SessionSearchRequest {
    #[validate(length(max = 4096))]
    pub q: String,
    #[serde(default)]
    pub mode: QueryMode,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub paging: PagingMode,
}

/// Move one page back or forward
pub async fn session_navigate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<NavigateRequest>,
) -> Result<Json<StoreSnapshot>> {
    request.validate()?;
    if request.delta == 0 {
        return Err(AppError::Validation("delta must be -1 or 1".to_string()));
    }
    let session = find_session(&state, &id).await?;

    let (navigation, handle) = session.navigate(request.delta);
    if let Some(handle) = handle {
        if let Err(e) = handle.await {
            tracing::debug!(session = %id, error = %e, "Page fetch did not complete");
        }
    }
    if navigation == Navigation::Unchanged {
        tracing::debug!(session = %id, delta = request.delta, "Navigation out of range");
    }
    Ok(Json(session.snapshot()))
}

#[derive(Debug, Deserialize, Validate)]
pub struct NavigateRequest {
    #[validate(range(min = -1, max = 1))]
    pub delta: i64,
}

/// Current state of a session
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<StoreSnapshot>> {
    let session = find_session(&state, &id).await?;
    Ok(Json(session.snapshot()))
}

/// Download everything a session holds
pub async fn session_export(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<SessionExportParams>,
) -> Result<Response> {
    let session = find_session(&state, &id).await?;
    if session.with_store(|store| store.state()) != StoreState::Populated {
        return Err(AppError::Validation(
            "session has no results to export".to_string(),
        ));
    }
    let truncated = session.with_store(|store| store.truncated());
    Ok(text_download(session.export_text(params.format), truncated))
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionExportParams {
    #[serde(default)]
    pub format: ExportFormat,
}

/// Close a session
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    if state.sessions.remove(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("session {}", id)))
    }
}

async fn find_session(state: &AppState, id: &Uuid) -> Result<Arc<SearchSession>> {
    state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("session {}", id)))
}

/// The error that emptied the store, if `query`'s submission failed
fn failed_submission(
    session: &SearchSession,
    query: &QueryDescriptor,
) -> Option<crate::search::SearchError> {
    session.with_store(|store| {
        let same_query = store.query() == Some(query);
        if same_query && store.state() == StoreState::Empty {
            store.last_error().cloned()
        } else {
            None
        }
    })
}

/// Set on downloads that stop at the result cap
pub const TRUNCATED_HEADER: &str = "x-results-truncated";

fn text_download(body: String, truncated: bool) -> Response {
    let mut response = (
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", EXPORT_FILE_NAME),
            ),
        ],
        body,
    )
        .into_response();
    if truncated {
        response.headers_mut().insert(
            HeaderName::from_static(TRUNCATED_HEADER),
            HeaderValue::from_static("true"),
        );
    }
    response
}
