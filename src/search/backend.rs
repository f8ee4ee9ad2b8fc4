//! Search backend abstraction
//!
//! The engine that actually stores and matches lines lives outside this
//! crate. Everything the paging core needs from it is one bounded request
//! per call, a total hit count and an optional continuation.

use crate::search::cursor::NativeCursor;
use crate::search::error::SearchResult;
use crate::search::query::QueryDescriptor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One matching line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub content: String,
    pub source_file: String,
    pub line_number: u64,
}

impl ResultRecord {
    pub fn new(content: impl Into<String>, source_file: impl Into<String>, line_number: u64) -> Self {
        Self {
            content: content.into(),
            source_file: source_file.into(),
            line_number,
        }
    }
}

/// How consecutive pages are addressed
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PagingStrategy {
    /// Stateful server-side scroll session
    Scroll,
    /// Sort-key continuation taken from the last hit
    #[default]
    SearchAfter,
    /// Explicit from/size window
    Offset,
}

impl PagingStrategy {
    /// Whether pages are chained through a continuation cursor
    pub fn uses_cursor(&self) -> bool {
        !matches!(self, PagingStrategy::Offset)
    }

    /// Whether a native continuation belongs to this strategy
    pub fn accepts(&self, cursor: &NativeCursor) -> bool {
        match self {
            PagingStrategy::Scroll => cursor.is_scroll(),
            PagingStrategy::SearchAfter => !cursor.is_scroll(),
            PagingStrategy::Offset => false,
        }
    }
}

/// Where the requested page starts
#[derive(Debug, Clone, PartialEq)]
pub enum PagePosition {
    /// First page of a cursor walk
    Start,
    /// Continue after a previously returned continuation
    After(NativeCursor),
    /// Skip this many records (offset paging)
    Offset(u64),
}

/// One bounded backend request
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub query: QueryDescriptor,
    pub strategy: PagingStrategy,
    pub position: PagePosition,
    pub size: usize,
}

/// Raw answer to a [`BackendRequest`]
#[derive(Debug, Clone, Default)]
pub struct BackendPage {
    /// Hits in backend order
    pub records: Vec<ResultRecord>,
    /// Total number of hits for the query
    pub total: u64,
    /// Continuation for the next page, if the backend issued one
    pub continuation: Option<NativeCursor>,
}

/// Trait for search engines the paging core can drive
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Human readable backend name for logs
    fn name(&self) -> &str;

    /// Largest `offset + size` the backend serves in offset mode
    fn max_result_window(&self) -> u64;

    /// Execute exactly one request
    async fn search(&self, request: &BackendRequest) -> SearchResult<BackendPage>;

    /// Whether the backend is reachable
    async fn ping(&self) -> bool;

    /// Free any server-side state held for a continuation
    async fn release(&self, _cursor: &NativeCursor) -> SearchResult<()> {
        Ok(())
    }
}
