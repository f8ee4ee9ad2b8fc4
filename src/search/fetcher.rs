//! Page fetching
//!
//! [`PageFetcher`] is the single boundary against the search backend: one
//! call, one bounded request. It validates sizes before dispatch, resolves
//! cursors, and turns raw backend answers into [`Page`]s with consistent
//! exhaustion signalling. It never retries and never mutates shared state.

use crate::error::{AppError, Result};
use crate::metrics;
use crate::search::backend::{
    BackendPage, BackendRequest, PagePosition, PagingStrategy, SearchBackend,
};
use crate::search::cursor::{Cursor, NativeCursor};
use crate::search::error::{SearchError, SearchResult};
use crate::search::query::QueryDescriptor;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

pub use crate::search::backend::ResultRecord;

/// One bounded batch of results
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    /// Records in backend order
    pub items: Vec<ResultRecord>,
    /// Continuation for the next page; `None` once exhausted
    #[serde(skip)]
    pub next_cursor: Option<Cursor>,
    /// No further pages exist
    pub exhausted: bool,
    /// Backend-reported total for the query
    pub total_results: u64,
    /// Server-side state to free once the caller is done with this page
    #[serde(skip)]
    pub(crate) release: Option<NativeCursor>,
}

impl Page {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Issues single page requests against a [`SearchBackend`]
#[derive(Clone)]
pub struct PageFetcher {
    backend: Arc<dyn SearchBackend>,
    cursor_strategy: PagingStrategy,
    max_page_size: usize,
}

impl PageFetcher {
    /// Create a fetcher chaining pages with `cursor_strategy`
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        cursor_strategy: PagingStrategy,
        max_page_size: usize,
    ) -> Result<Self> {
        if !cursor_strategy.uses_cursor() {
            return Err(AppError::Configuration(
                "search.cursor_strategy must be scroll or search_after".to_string(),
            ));
        }
        if max_page_size == 0 {
            return Err(AppError::Configuration(
                "search.max_page_size must be positive".to_string(),
            ));
        }

        Ok(Self {
            backend,
            cursor_strategy,
            max_page_size,
        })
    }

    pub fn cursor_strategy(&self) -> PagingStrategy {
        self.cursor_strategy
    }

    pub fn max_page_size(&self) -> usize {
        self.max_page_size
    }

    pub fn backend(&self) -> &Arc<dyn SearchBackend> {
        &self.backend
    }

    fn check_page_size(&self, page_size: usize) -> SearchResult<()> {
        if page_size == 0 {
            return Err(SearchError::InvalidQuery(
                "page size must be positive".to_string(),
            ));
        }
        if page_size > self.max_page_size {
            return Err(SearchError::PageSizeExceeded {
                requested: page_size,
                max: self.max_page_size,
            });
        }
        Ok(())
    }

    /// Fetch the page following `cursor`, or the first page without one
    pub async fn fetch(
        &self,
        query: &QueryDescriptor,
        cursor: Option<&Cursor>,
        page_size: usize,
    ) -> SearchResult<Page> {
        self.check_page_size(page_size)?;

        let (position, delivered_before) = match cursor {
            None => (PagePosition::Start, 0),
            Some(cursor) => {
                let native = cursor.decode(query)?;
                if !self.cursor_strategy.accepts(&native) {
                    return Err(SearchError::MalformedCursor(format!(
                        "cursor does not belong to {} paging",
                        self.cursor_strategy
                    )));
                }
                (PagePosition::After(native), cursor.position())
            }
        };

        let request = BackendRequest {
            query: query.clone(),
            strategy: self.cursor_strategy,
            position,
            size: page_size,
        };
        let raw = self.dispatch(&request).await?;

        self.cursor_page(query, raw, delivered_before, page_size)
    }

    /// Fetch page `page_number` (1-based) with explicit offset paging
    pub async fn fetch_offset(
        &self,
        query: &QueryDescriptor,
        page_number: u64,
        page_size: usize,
    ) -> SearchResult<Page> {
        self.check_page_size(page_size)?;
        if page_number == 0 {
            return Err(SearchError::InvalidQuery(
                "page numbers start at 1".to_string(),
            ));
        }

        let offset = (page_number - 1).saturating_mul(page_size as u64);
        let max_window = self.backend.max_result_window();
        if offset.saturating_add(page_size as u64) > max_window {
            return Err(SearchError::OffsetWindowExceeded {
                offset,
                page_size,
                max_window,
            });
        }

        let request = BackendRequest {
            query: query.clone(),
            strategy: PagingStrategy::Offset,
            position: PagePosition::Offset(offset),
            size: page_size,
        };
        let raw = self.dispatch(&request).await?;

        if raw.records.len() > page_size {
            return Err(SearchError::ProtocolViolation(format!(
                "asked for {} records, received {}",
                page_size,
                raw.records.len()
            )));
        }

        let delivered = offset + raw.records.len() as u64;
        Ok(Page {
            exhausted: raw.records.is_empty() || delivered >= raw.total,
            items: raw.records,
            next_cursor: None,
            total_results: raw.total,
            release: None,
        })
    }

    /// Free server-side state held by a page, best-effort
    pub async fn release(&self, page: &Page) {
        if let Some(native) = &page.release {
            self.release_native(native).await;
        }
    }

    /// Free server-side state behind a cursor that will not be followed
    pub async fn abandon(&self, query: &QueryDescriptor, cursor: &Cursor) {
        if let Ok(native) = cursor.decode(query) {
            self.release_native(&native).await;
        }
    }

    pub(crate) async fn release_native(&self, native: &NativeCursor) {
        if let Err(e) = self.backend.release(native).await {
            warn!(backend = self.backend.name(), error = %e, "Failed to release continuation");
        }
    }

    async fn dispatch(&self, request: &BackendRequest) -> SearchResult<BackendPage> {
        let start = Instant::now();
        let result = self.backend.search(request).await;
        let elapsed = start.elapsed();

        metrics::record_fetch(&request.strategy, &result, elapsed);

        match &result {
            Ok(page) => debug!(
                backend = self.backend.name(),
                strategy = %request.strategy,
                page_size = request.size,
                returned = page.records.len(),
                total = page.total,
                elapsed_ms = elapsed.as_millis() as u64,
                "Fetched page"
            ),
            Err(e) => warn!(
                backend = self.backend.name(),
                strategy = %request.strategy,
                error = %e,
                "Page fetch failed"
            ),
        }

        result
    }

    fn cursor_page(
        &self,
        query: &QueryDescriptor,
        raw: BackendPage,
        delivered_before: u64,
        page_size: usize,
    ) -> SearchResult<Page> {
        let returned = raw.records.len();
        if returned > page_size {
            return Err(SearchError::ProtocolViolation(format!(
                "asked for {} records, received {}",
                page_size, returned
            )));
        }

        let delivered = delivered_before + returned as u64;
        if delivered >= raw.total {
            return Ok(Page {
                items: raw.records,
                next_cursor: None,
                exhausted: true,
                total_results: raw.total,
                release: raw.continuation.filter(NativeCursor::is_scroll),
            });
        }

        // The backend stopped delivering while its own total says more remain
        if returned < page_size {
            return Err(SearchError::ProtocolViolation(format!(
                "page of {} records (asked for {}) ended the results after {} of {}",
                returned, page_size, delivered, raw.total
            )));
        }

        let continuation = raw.continuation.ok_or_else(|| {
            SearchError::ProtocolViolation(
                "backend reported more results but issued no continuation".to_string(),
            )
        })?;
        if !self.cursor_strategy.accepts(&continuation) {
            return Err(SearchError::ProtocolViolation(format!(
                "backend issued a continuation foreign to {} paging",
                self.cursor_strategy
            )));
        }

        Ok(Page {
            items: raw.records,
            next_cursor: Some(Cursor::encode(continuation, query, delivered)),
            exhausted: false,
            total_results: raw.total,
            release: None,
        })
    }
}
