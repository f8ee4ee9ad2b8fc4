//! Result store
//!
//! Explicit per-session search state. A UI renders from the store; it never
//! owns search logic. Every fetch is identified by a [`FetchTicket`] and only
//! the ticket currently in flight may change the store, so responses that
//! arrive after a newer submission are dropped.
//!
//! ```text
//! Empty ──submit──▶ Fetching ──receive──▶ Populated ──navigate (not held locally)──▶ Fetching
//!   ▲                  │                      │                                         │
//!   └──receive_error───┘                      └─────────────submit─────────▶ Fetching   │
//!                         Populated ◀──receive / receive_error (navigation)─────────────┘
//! ```

use crate::search::backend::ResultRecord;
use crate::search::cursor::Cursor;
use crate::search::error::SearchError;
use crate::search::export::{self, ExportFormat};
use crate::search::query::QueryDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Lifecycle state of a [`ResultStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StoreState {
    Empty,
    Fetching,
    Populated,
}

/// How the store obtains the pages it shows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PagingMode {
    /// Walk the whole result set once, then page locally
    #[default]
    Materialize,
    /// Fetch each numbered page from the backend on demand
    Offset,
    /// Follow the continuation cursor one page at a time, appending each
    /// page to the records already held ("load more")
    Cursor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchKind {
    /// Fresh query submission
    Submission,
    /// Page change within the current query
    Navigation,
}

/// Identifies one outstanding fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    generation: u64,
    kind: FetchKind,
    page: u64,
}

impl FetchTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn kind(&self) -> FetchKind {
        self.kind
    }

    /// Page the fetch is for (always 1 for submissions)
    pub fn page(&self) -> u64 {
        self.page
    }
}

/// Payload delivered for a ticket
#[derive(Debug, Clone)]
pub enum Received {
    /// Complete result set from a full walk
    Full {
        records: Vec<ResultRecord>,
        truncated: bool,
    },
    /// The ticket's page from offset paging
    Page {
        items: Vec<ResultRecord>,
        total_results: u64,
    },
    /// The next cursor page, appended to what is held
    Batch {
        items: Vec<ResultRecord>,
        total_results: u64,
        next_cursor: Option<Cursor>,
    },
}

/// Outcome of [`ResultStore::navigate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    /// Target page was out of range or navigation is not possible now
    Unchanged,
    /// Moved to a page already held locally
    Moved(u64),
    /// Page must be fetched; deliver it with this ticket
    Fetch(FetchTicket),
}

/// Serializable view of the store
#[derive(Debug, Clone, Serialize)]
pub struct StoreSnapshot {
    pub state: StoreState,
    pub query: Option<String>,
    pub paging: PagingMode,
    pub current_page: u64,
    pub total_pages: u64,
    pub page_size: usize,
    pub total_results: u64,
    pub truncated: bool,
    /// Records held locally (all pages fetched so far)
    pub held: usize,
    pub items: Vec<ResultRecord>,
    pub error: Option<String>,
}

/// Fetched results plus pagination state for one session
#[derive(Debug)]
pub struct ResultStore {
    state: StoreState,
    paging: PagingMode,
    query: Option<QueryDescriptor>,
    all_results: Vec<ResultRecord>,
    pages: BTreeMap<u64, Vec<ResultRecord>>,
    next_cursor: Option<Cursor>,
    total_results: u64,
    truncated: bool,
    page_size: usize,
    current_page: u64,
    generation: u64,
    in_flight: Option<FetchTicket>,
    last_error: Option<SearchError>,
}

impl ResultStore {
    /// Create an empty store showing `page_size` records per page
    pub fn new(page_size: usize) -> Self {
        Self {
            state: StoreState::Empty,
            paging: PagingMode::default(),
            query: None,
            all_results: Vec::new(),
            pages: BTreeMap::new(),
            next_cursor: None,
            total_results: 0,
            truncated: false,
            page_size: page_size.max(1),
            current_page: 1,
            generation: 0,
            in_flight: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> StoreState {
        self.state
    }

    pub fn paging(&self) -> PagingMode {
        self.paging
    }

    pub fn query(&self) -> Option<&QueryDescriptor> {
        self.query.as_ref()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn current_page(&self) -> u64 {
        self.current_page
    }

    pub fn total_results(&self) -> u64 {
        self.total_results
    }

    /// The held results stop at the walk's result cap
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn last_error(&self) -> Option<&SearchError> {
        self.last_error.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn in_flight(&self) -> Option<FetchTicket> {
        self.in_flight
    }

    /// Continuation for the page after the last one held (cursor paging)
    pub fn continuation(&self) -> Option<&Cursor> {
        self.next_cursor.as_ref()
    }

    /// Whether `ticket` is the fetch the store is waiting for
    pub fn is_current(&self, ticket: &FetchTicket) -> bool {
        self.in_flight.as_ref() == Some(ticket)
    }

    /// `ceil(total_results / page_size)`
    pub fn total_pages(&self) -> u64 {
        self.total_results.div_ceil(self.page_size as u64)
    }

    /// Start a new search, discarding everything from the previous one
    pub fn submit(&mut self, query: QueryDescriptor, paging: PagingMode) -> FetchTicket {
        self.generation += 1;
        self.state = StoreState::Fetching;
        self.paging = paging;
        self.query = Some(query);
        self.all_results.clear();
        self.pages.clear();
        self.next_cursor = None;
        self.total_results = 0;
        self.truncated = false;
        self.current_page = 1;
        self.last_error = None;

        let ticket = FetchTicket {
            generation: self.generation,
            kind: FetchKind::Submission,
            page: 1,
        };
        self.in_flight = Some(ticket);
        ticket
    }

    /// Apply a fetch result. Returns false if the ticket is stale.
    pub fn receive(&mut self, ticket: FetchTicket, payload: Received) -> bool {
        if !self.is_current(&ticket) {
            debug!(
                generation = ticket.generation,
                current = self.generation,
                "Discarding stale fetch result"
            );
            return false;
        }

        match payload {
            Received::Full { records, truncated } => {
                self.total_results = records.len() as u64;
                self.truncated = truncated;
                self.all_results = records;
            }
            Received::Page {
                items,
                total_results,
            } => {
                self.total_results = total_results;
                self.pages.insert(ticket.page, items);
                self.current_page = ticket.page;
            }
            Received::Batch {
                items,
                total_results,
                next_cursor,
            } => {
                self.total_results = total_results;
                self.all_results.extend(items);
                self.next_cursor = next_cursor;
                self.current_page = ticket.page;
            }
        }

        self.state = StoreState::Populated;
        self.in_flight = None;
        self.last_error = None;
        self.clamp_current_page();
        true
    }

    /// Record a failed fetch. Returns false if the ticket is stale.
    ///
    /// A failed submission empties the store; a failed page change keeps the
    /// results that were already shown.
    pub fn receive_error(&mut self, ticket: FetchTicket, error: SearchError) -> bool {
        if !self.is_current(&ticket) {
            debug!(generation = ticket.generation, "Discarding stale fetch error");
            return false;
        }

        match ticket.kind {
            FetchKind::Submission => {
                self.state = StoreState::Empty;
                self.all_results.clear();
                self.pages.clear();
                self.next_cursor = None;
                self.total_results = 0;
                self.truncated = false;
                self.current_page = 1;
            }
            FetchKind::Navigation => {
                self.state = StoreState::Populated;
            }
        }

        self.in_flight = None;
        self.last_error = Some(error);
        true
    }

    /// Move one page back (`-1`) or forward (`+1`)
    pub fn navigate(&mut self, delta: i64) -> Navigation {
        if self.state != StoreState::Populated || delta == 0 {
            return Navigation::Unchanged;
        }

        let target = self.current_page as i64 + delta.signum();
        if target < 1 || target as u64 > self.total_pages() {
            return Navigation::Unchanged;
        }
        let target = target as u64;

        match self.paging {
            PagingMode::Materialize => {
                self.current_page = target;
                Navigation::Moved(target)
            }
            PagingMode::Offset if self.pages.contains_key(&target) => {
                self.current_page = target;
                Navigation::Moved(target)
            }
            PagingMode::Offset => self.fetch_page(target),
            PagingMode::Cursor => {
                let held = self.all_results.len() as u64;
                let page_size = self.page_size as u64;
                let fully_held = held >= target * page_size;
                let last_held = self.next_cursor.is_none() && held > (target - 1) * page_size;
                if fully_held || last_held {
                    self.current_page = target;
                    Navigation::Moved(target)
                } else if self.next_cursor.is_some() {
                    self.fetch_page(target)
                } else {
                    Navigation::Unchanged
                }
            }
        }
    }

    fn fetch_page(&mut self, page: u64) -> Navigation {
        let ticket = FetchTicket {
            generation: self.generation,
            kind: FetchKind::Navigation,
            page,
        };
        self.state = StoreState::Fetching;
        self.in_flight = Some(ticket);
        Navigation::Fetch(ticket)
    }

    /// Records of the current page
    pub fn current_items(&self) -> &[ResultRecord] {
        match self.paging {
            PagingMode::Materialize | PagingMode::Cursor => {
                let start = ((self.current_page - 1) as usize).saturating_mul(self.page_size);
                let start = start.min(self.all_results.len());
                let end = (start + self.page_size).min(self.all_results.len());
                &self.all_results[start..end]
            }
            PagingMode::Offset => self
                .pages
                .get(&self.current_page)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
        }
    }

    /// Every record held, in result order
    pub fn all_results(&self) -> Vec<&ResultRecord> {
        match self.paging {
            PagingMode::Materialize | PagingMode::Cursor => self.all_results.iter().collect(),
            PagingMode::Offset => self.pages.values().flatten().collect(),
        }
    }

    /// Newline-joined text of every record held
    pub fn export_text(&self, format: ExportFormat) -> String {
        let records: Vec<ResultRecord> = self.all_results().into_iter().cloned().collect();
        export::render(&records, format)
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            state: self.state,
            query: self.query.as_ref().map(|q| q.raw_text().to_string()),
            paging: self.paging,
            current_page: self.current_page,
            total_pages: self.total_pages(),
            page_size: self.page_size,
            total_results: self.total_results,
            truncated: self.truncated,
            held: self.all_results().len(),
            items: self.current_items().to_vec(),
            error: self.last_error.as_ref().map(ToString::to_string),
        }
    }

    fn clamp_current_page(&mut self) {
        let pages = self.total_pages();
        if pages == 0 {
            self.current_page = 1;
        } else if self.current_page > pages {
            self.current_page = pages;
        }
    }
}
