//! Interactive search sessions
//!
//! A [`SearchSession`] pairs one [`ResultStore`] with the background task
//! filling it. Submitting a new query aborts the task still working on the
//! previous one; anything it delivers afterwards carries a stale ticket and
//! is dropped by the store. Tickets are issued and tasks registered under
//! one lock, so the task left running always holds the newest ticket.

use crate::config::SessionConfig;
use crate::metrics;
use crate::search::cursor::Cursor;
use crate::search::error::{SearchError, SearchResult};
use crate::search::export::ExportFormat;
use crate::search::query::QueryDescriptor;
use crate::search::store::{
    FetchTicket, Navigation, PagingMode, Received, ResultStore, StoreSnapshot,
};
use crate::search::walker::Walker;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::debug;
use uuid::Uuid;

/// One user's search state
pub struct SearchSession {
    id: Uuid,
    created_at: DateTime<Utc>,
    walker: Walker,
    store: Arc<Mutex<ResultStore>>,
    task: Mutex<Option<AbortHandle>>,
}

impl SearchSession {
    pub fn new(walker: Walker, page_size: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            walker,
            store: Arc::new(Mutex::new(ResultStore::new(page_size))),
            task: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Start a search for `query`, superseding any fetch in flight.
    ///
    /// The returned handle completes once the store has been updated (or the
    /// fetch was superseded).
    pub fn submit(&self, query: QueryDescriptor, paging: PagingMode) -> JoinHandle<()> {
        // Held until the new task is registered so tickets and aborts stay in order
        let mut task = self.task.lock();
        let (ticket, dangling) = {
            let mut store = self.store.lock();
            let dangling = store.query().cloned().zip(store.continuation().cloned());
            (store.submit(query.clone(), paging), dangling)
        };
        debug!(session = %self.id, query = query.raw_text(), paging = ?paging, "Query submitted");

        if let Some((previous, cursor)) = dangling.filter(|(_, c)| c.native().is_scroll()) {
            let fetcher = self.walker.fetcher().clone();
            tokio::spawn(async move { fetcher.abandon(&previous, &cursor).await });
        }

        self.spawn_fetch(&mut task, ticket, query, paging, None)
    }

    /// Move one page back or forward.
    ///
    /// Returns a handle when the target page has to be fetched first.
    pub fn navigate(&self, delta: i64) -> (Navigation, Option<JoinHandle<()>>) {
        let mut task = self.task.lock();
        let (navigation, query, paging, cursor) = {
            let mut store = self.store.lock();
            let navigation = store.navigate(delta);
            (
                navigation,
                store.query().cloned(),
                store.paging(),
                store.continuation().cloned(),
            )
        };

        match (navigation, query) {
            (Navigation::Fetch(ticket), Some(query)) => {
                let handle = self.spawn_fetch(&mut task, ticket, query, paging, cursor);
                (navigation, Some(handle))
            }
            _ => (navigation, None),
        }
    }

    /// Abort the fetch in flight, if any
    pub fn cancel(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.store.lock().snapshot()
    }

    pub fn export_text(&self, format: ExportFormat) -> String {
        self.store.lock().export_text(format)
    }

    /// Run `f` against the store under its lock
    pub fn with_store<R>(&self, f: impl FnOnce(&ResultStore) -> R) -> R {
        f(&self.store.lock())
    }

    fn spawn_fetch(
        &self,
        slot: &mut Option<AbortHandle>,
        ticket: FetchTicket,
        query: QueryDescriptor,
        paging: PagingMode,
        cursor: Option<Cursor>,
    ) -> JoinHandle<()> {
        let walker = self.walker.clone();
        let store = Arc::clone(&self.store);
        let page_size = store.lock().page_size();
        let session = self.id;

        let handle = tokio::spawn(async move {
            let outcome = match paging {
                PagingMode::Materialize => walker
                    .materialize(&query)
                    .await
                    .map(|done| Received::Full {
                        records: done.records,
                        truncated: done.truncated,
                    })
                    .map_err(|e| e.source),
                PagingMode::Offset => walker
                    .page(&query, ticket.page(), page_size)
                    .await
                    .map(|page| Received::Page {
                        items: page.items,
                        total_results: page.total_results,
                    }),
                PagingMode::Cursor => {
                    match walker.next_page(&query, cursor.as_ref(), page_size).await {
                        Ok(page) => {
                            walker.fetcher().release(&page).await;
                            Ok(Received::Batch {
                                items: page.items,
                                total_results: page.total_results,
                                next_cursor: page.next_cursor,
                            })
                        }
                        Err(e) => Err(e),
                    }
                }
            };

            let mut store = store.lock();
            let applied = match outcome {
                Ok(payload) => store.receive(ticket, payload),
                Err(e) => store.receive_error(ticket, e),
            };
            if !applied {
                debug!(%session, generation = ticket.generation(), "Superseded fetch finished");
            }
        });

        if let Some(previous) = slot.replace(handle.abort_handle()) {
            previous.abort();
        }
        handle
    }
}

/// Live sessions, dropped after a period of inactivity
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Cache<Uuid, Arc<SearchSession>>,
    walker: Walker,
    default_page_size: usize,
}

impl SessionRegistry {
    pub fn new(walker: Walker, config: &SessionConfig, default_page_size: usize) -> Self {
        let sessions = Cache::builder()
            .max_capacity(config.max_sessions)
            .time_to_idle(Duration::from_secs(config.idle_timeout_secs))
            .eviction_listener(|id: Arc<Uuid>, session: Arc<SearchSession>, cause| {
                session.cancel();
                metrics::SESSIONS_ACTIVE.dec();
                debug!(session = %id, cause = ?cause, "Session closed");
            })
            .build();

        Self {
            sessions,
            walker,
            default_page_size,
        }
    }

    /// Open a session showing `page_size` records per page
    pub async fn create(&self, page_size: Option<usize>) -> SearchResult<Arc<SearchSession>> {
        let page_size = page_size.unwrap_or(self.default_page_size);
        let max = self.walker.fetcher().max_page_size();
        if page_size == 0 {
            return Err(SearchError::InvalidQuery(
                "page size must be positive".to_string(),
            ));
        }
        if page_size > max {
            return Err(SearchError::PageSizeExceeded {
                requested: page_size,
                max,
            });
        }

        let session = Arc::new(SearchSession::new(self.walker.clone(), page_size));
        self.sessions.insert(session.id(), Arc::clone(&session)).await;
        metrics::SESSIONS_ACTIVE.inc();
        debug!(session = %session.id(), page_size, "Session opened");

        Ok(session)
    }

    pub async fn get(&self, id: &Uuid) -> Option<Arc<SearchSession>> {
        self.sessions.get(id).await
    }

    /// Close a session; returns false if it did not exist
    pub async fn remove(&self, id: &Uuid) -> bool {
        self.sessions.remove(id).await.is_some()
    }

    pub fn len(&self) -> u64 {
        self.sessions.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
