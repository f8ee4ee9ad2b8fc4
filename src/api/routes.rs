use crate::api::{handlers, AppState};
use crate::metrics;
use axum::{
    extract::{MatchedPath, Request},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::time::{Duration, Instant};
use tower_http::{
    cors::CorsLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Build the main API router
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/health/live", get(handlers::liveness))
        .route("/metrics", get(handlers::metrics_endpoint))
        // Stateless paging
        .route("/search", get(handlers::search))
        .route("/export", get(handlers::export))
        // Interactive sessions
        .route("/sessions", post(handlers::create_session))
        .route(
            "/sessions/:id",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/sessions/:id/search", post(handlers::session_search))
        .route("/sessions/:id/navigate", post(handlers::session_navigate))
        .route("/sessions/:id/export", get(handlers::session_export))
        // Add state
        .with_state(state)
        // Add middleware
        .layer(middleware::from_fn(track_metrics))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
}

/// Record request count and latency by route template
async fn track_metrics(request: Request, next: Next) -> Response {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = request.method().to_string();

    let start = Instant::now();
    let response = next.run(request).await;
    metrics::record_http(&method, &path, response.status().as_u16(), start.elapsed());

    response
}
