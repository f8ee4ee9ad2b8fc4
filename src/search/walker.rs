//! Aggregating walker
//!
//! Drives the [`PageFetcher`] either through a whole result set (full
//! materialization, cursor paging) or to one numbered page (offset paging).

use crate::metrics;
use crate::search::backend::{PagingStrategy, ResultRecord};
use crate::search::cursor::Cursor;
use crate::search::error::{SearchError, SearchResult};
use crate::search::fetcher::{Page, PageFetcher};
use crate::search::query::QueryDescriptor;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info, warn};

/// Bounded retry policy for transient backend faults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    retries: u8,
    backoff: Duration,
}

impl RetryPolicy {
    /// Fail on the first error
    pub fn none() -> Self {
        Self {
            retries: 0,
            backoff: Duration::ZERO,
        }
    }

    /// Retry a failed page once after `backoff`
    pub fn once(backoff: Duration) -> Self {
        Self { retries: 1, backoff }
    }

    pub fn retries(&self) -> u8 {
        self.retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Every record of a result set, in backend order
#[derive(Debug, Clone, Serialize)]
pub struct Materialized {
    pub records: Vec<ResultRecord>,
    /// Total reported by the first page
    pub total_results: u64,
    /// Backend round trips performed, retries included
    pub fetches: usize,
    /// Stopped at the configured cap before exhaustion
    pub truncated: bool,
}

/// A walk that stopped early, with whatever it had accumulated
#[derive(Debug, thiserror::Error)]
#[error("walk aborted after {} records: {source}", .partial.len())]
pub struct WalkError {
    pub partial: Vec<ResultRecord>,
    pub fetches: usize,
    pub source: SearchError,
}

/// Accumulates pages from a [`PageFetcher`]
#[derive(Clone)]
pub struct Walker {
    fetcher: PageFetcher,
    walk_page_size: usize,
    max_total_results: u64,
    retry: RetryPolicy,
}

impl Walker {
    /// Create a walker; `walk_page_size` is clamped to the fetcher's maximum.
    pub fn new(fetcher: PageFetcher, walk_page_size: usize, max_total_results: u64) -> Self {
        let max = fetcher.max_page_size();
        let walk_page_size = if walk_page_size == 0 || walk_page_size > max {
            warn!(requested = walk_page_size, max, "Clamping walk page size");
            walk_page_size.clamp(1, max)
        } else {
            walk_page_size
        };

        Self {
            fetcher,
            walk_page_size,
            max_total_results,
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn fetcher(&self) -> &PageFetcher {
        &self.fetcher
    }

    pub fn walk_page_size(&self) -> usize {
        self.walk_page_size
    }

    /// Fetch every page, following cursors until exhaustion.
    ///
    /// A failure on any page aborts the walk; the records gathered so far are
    /// returned inside the [`WalkError`].
    pub async fn materialize(&self, query: &QueryDescriptor) -> Result<Materialized, WalkError> {
        let mut records: Vec<ResultRecord> = Vec::new();
        let mut cursor: Option<Cursor> = None;
        let mut total_results: Option<u64> = None;
        let mut fetches = 0usize;
        let mut truncated = false;

        loop {
            let page = match self
                .fetch_cursor_page(query, cursor.as_ref(), self.walk_page_size, &mut fetches)
                .await
            {
                Ok(page) => page,
                Err(source) => {
                    return Err(self.abort(query, cursor.as_ref(), records, fetches, source).await)
                }
            };

            total_results.get_or_insert(page.total_results);

            if !page.exhausted && page.items.is_empty() {
                let source = SearchError::ProtocolViolation(
                    "non-exhausted page carried no records".to_string(),
                );
                return Err(self.abort(query, page.next_cursor.as_ref(), records, fetches, source).await);
            }

            if let (Some(previous), Some(next)) = (&cursor, &page.next_cursor) {
                if next.position() <= previous.position() {
                    let source = SearchError::ProtocolViolation(
                        "continuation did not advance".to_string(),
                    );
                    return Err(self.abort(query, Some(next), records, fetches, source).await);
                }
            }

            let Page {
                items,
                next_cursor,
                exhausted,
                release,
                ..
            } = page;

            let room = self.max_total_results.saturating_sub(records.len() as u64) as usize;
            if items.len() > room {
                records.extend(items.into_iter().take(room));
                truncated = true;
            } else {
                records.extend(items);
            }

            if exhausted {
                if let Some(native) = &release {
                    self.fetcher.release_native(native).await;
                }
                break;
            }

            let Some(next) = next_cursor else {
                let source = SearchError::ProtocolViolation(
                    "non-exhausted page carried no continuation".to_string(),
                );
                return Err(self.abort(query, None, records, fetches, source).await);
            };

            if truncated || records.len() as u64 >= self.max_total_results {
                truncated = true;
                self.fetcher.abandon(query, &next).await;
                break;
            }
            cursor = Some(next);
        }

        let total_results = total_results.unwrap_or(0);
        if truncated {
            warn!(
                query = query.raw_text(),
                cap = self.max_total_results,
                total_results,
                "Materialization stopped at the result cap"
            );
        }

        info!(
            query = query.raw_text(),
            strategy = %self.fetcher.cursor_strategy(),
            fetches,
            records = records.len(),
            total_results,
            "Materialized result set"
        );
        metrics::record_walk("completed", records.len());

        Ok(Materialized {
            records,
            total_results,
            fetches,
            truncated,
        })
    }

    /// Fetch one numbered page with offset paging; never touches cursors
    pub async fn page(
        &self,
        query: &QueryDescriptor,
        page_number: u64,
        page_size: usize,
    ) -> SearchResult<Page> {
        let mut attempt = 0u8;
        loop {
            match self.fetcher.fetch_offset(query, page_number, page_size).await {
                Err(e) if e.is_retryable() && attempt < self.retry.retries => {
                    attempt += 1;
                    warn!(page_number, attempt, error = %e, "Retrying page fetch");
                    tokio::time::sleep(self.retry.backoff).await;
                }
                result => return result,
            }
        }
    }

    /// Fetch the page after `cursor` (the first page without one), under the
    /// same retry policy as a full walk. The caller owns any scroll context
    /// the page holds.
    pub async fn next_page(
        &self,
        query: &QueryDescriptor,
        cursor: Option<&Cursor>,
        page_size: usize,
    ) -> SearchResult<Page> {
        let mut fetches = 0;
        self.fetch_cursor_page(query, cursor, page_size, &mut fetches)
            .await
    }

    async fn fetch_cursor_page(
        &self,
        query: &QueryDescriptor,
        cursor: Option<&Cursor>,
        page_size: usize,
        fetches: &mut usize,
    ) -> SearchResult<Page> {
        // A scroll may have advanced server-side before the failure surfaced
        let retries = match self.fetcher.cursor_strategy() {
            PagingStrategy::Scroll => 0,
            _ => self.retry.retries,
        };

        let mut attempt = 0u8;
        loop {
            *fetches += 1;
            match self.fetcher.fetch(query, cursor, page_size).await {
                Err(e) if e.is_retryable() && attempt < retries => {
                    attempt += 1;
                    warn!(fetches = *fetches, attempt, error = %e, "Retrying page fetch");
                    tokio::time::sleep(self.retry.backoff).await;
                }
                result => return result,
            }
        }
    }

    async fn abort(
        &self,
        query: &QueryDescriptor,
        dangling: Option<&Cursor>,
        partial: Vec<ResultRecord>,
        fetches: usize,
        source: SearchError,
    ) -> WalkError {
        if let Some(cursor) = dangling {
            self.fetcher.abandon(query, cursor).await;
        }

        match &source {
            SearchError::ProtocolViolation(_) => error!(
                query = query.raw_text(),
                fetches,
                partial = partial.len(),
                error = %source,
                "Walk aborted by protocol violation"
            ),
            _ => warn!(
                query = query.raw_text(),
                fetches,
                partial = partial.len(),
                error = %source,
                "Walk aborted"
            ),
        }
        metrics::record_walk("aborted", partial.len());

        WalkError {
            partial,
            fetches,
            source,
        }
    }
}
