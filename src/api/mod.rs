pub mod handlers;
pub mod routes;

pub use routes::*;

use crate::config::{SearchSettings, SessionConfig};
use crate::error::Result;
use crate::search::{PageFetcher, RetryPolicy, SearchBackend, SessionRegistry, Walker};
use std::sync::Arc;
use std::time::Duration;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn SearchBackend>,
    pub fetcher: PageFetcher,
    pub walker: Walker,
    pub sessions: SessionRegistry,
    pub settings: Arc<SearchSettings>,
}

impl AppState {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        settings: &SearchSettings,
        sessions: &SessionConfig,
    ) -> Result<Self> {
        let fetcher = PageFetcher::new(
            Arc::clone(&backend),
            settings.cursor_strategy,
            settings.max_page_size,
        )?;

        let retry = if settings.retry_enabled {
            RetryPolicy::once(Duration::from_millis(settings.retry_backoff_ms))
        } else {
            RetryPolicy::none()
        };
        let walker = Walker::new(
            fetcher.clone(),
            settings.walk_page_size,
            settings.max_total_results,
        )
        .with_retry(retry);

        let default_page_size = settings.default_page_size.clamp(1, settings.max_page_size);
        let sessions = SessionRegistry::new(walker.clone(), sessions, default_page_size);

        Ok(Self {
            backend,
            fetcher,
            walker,
            sessions,
            settings: Arc::new(settings.clone()),
        })
    }

    /// Page size used when a request gives none
    pub fn default_page_size(&self) -> usize {
        self.settings
            .default_page_size
            .clamp(1, self.fetcher.max_page_size())
    }
}
