use line_search::{
    api::{build_router, AppState},
    config::Config,
    keepalive::Keepalive,
    search::create_backend,
};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config_result = Config::load();
    let config = config_result.as_ref().cloned().unwrap_or_default();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "line_search={},tower_http=info",
            config.observability.log_level
        )
        .into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    if let Err(e) = &config_result {
        tracing::warn!("Failed to load configuration: {}", e);
        tracing::warn!("Using default configuration");
    }

    tracing::info!("Starting line-search v{}", env!("CARGO_PKG_VERSION"));

    // Initialize Prometheus metrics
    if config.observability.prometheus_enabled {
        if let Err(e) = line_search::metrics::init_metrics() {
            tracing::warn!("Failed to initialize metrics: {}", e);
            tracing::warn!("Continuing without metrics");
        }
    } else {
        tracing::info!("Prometheus metrics disabled in configuration");
    }

    // Initialize search backend
    let backend = create_backend(&config.backend)?;
    if backend.ping().await {
        tracing::info!(backend = backend.name(), "Search backend reachable");
    } else {
        tracing::warn!(backend = backend.name(), "Search backend not reachable yet");
    }

    tracing::info!(
        strategy = %config.search.cursor_strategy,
        max_page_size = config.search.max_page_size,
        walk_page_size = config.search.walk_page_size,
        "Paging configured"
    );

    let app_state = AppState::new(backend.clone(), &config.search, &config.sessions)?;

    // Spawn keepalive loop
    if Keepalive::spawn(&config.keepalive, backend)?.is_some() {
        tracing::info!(
            interval_secs = config.keepalive.interval_secs,
            "Keepalive started"
        );
    }

    // Build HTTP router
    let app = build_router(
        app_state,
        Duration::from_secs(config.server.request_timeout_secs),
    );

    // Start HTTP server
    let http_addr = format!("{}:{}", config.server.host, config.server.http_port);
    let http_listener = tokio::net::TcpListener::bind(&http_addr).await?;

    tracing::info!("HTTP API server listening on http://{}", http_addr);
    tracing::info!("   Health check: http://{}/health", http_addr);
    tracing::info!("   Search: http://{}/search?q=", http_addr);

    let http_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(http_listener, app).await {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    tokio::select! {
        _ = http_handle => {
            tracing::warn!("HTTP server stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    tracing::info!("Shutting down gracefully...");
    Ok(())
}
