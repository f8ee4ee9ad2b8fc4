//! Paginated line search over a document backend
//!
//! Every matching line of a leaked-data corpus is reachable by paging
//! through an Elasticsearch index that refuses to return large result sets
//! in one request. The pipeline is:
//!
//! ```text
//!  raw text ──normalize──▶ QueryDescriptor
//!                               │
//!                               ▼
//!  ┌──────────────┐   one bounded request   ┌──────────────────┐
//!  │ PageFetcher  │────────────────────────▶│  SearchBackend   │
//!  │  (Cursor)    │◀────────────────────────│ (ES / in-memory) │
//!  └──────────────┘        BackendPage      └──────────────────┘
//!        ▲
//!        │ pages
//!  ┌──────────────┐   Received / errors    ┌──────────────────┐
//!  │    Walker    │───────────────────────▶│   ResultStore    │
//!  └──────────────┘                        │ (per session)    │
//!                                          └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use line_search::search::{normalize, MemoryBackend, PageFetcher, PagingStrategy, QueryMode, Walker};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = Arc::new(MemoryBackend::from_files(&["dump.txt"])?);
//! let fetcher = PageFetcher::new(backend, PagingStrategy::SearchAfter, 10_000)?;
//! let walker = Walker::new(fetcher, 5_000, 1_000_000);
//!
//! let query = normalize("@bilkent.edu.tr", QueryMode::Substring)?;
//! let all = walker.materialize(&query).await?;
//! println!("{} lines", all.records.len());
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod cursor;
pub mod elasticsearch;
pub mod error;
pub mod export;
pub mod fetcher;
pub mod memory;
pub mod query;
pub mod session;
pub mod store;
pub mod walker;

pub use backend::{
    BackendPage, BackendRequest, PagePosition, PagingStrategy, ResultRecord, SearchBackend,
};
pub use cursor::{Cursor, NativeCursor, SortValue};
pub use elasticsearch::ElasticsearchBackend;
pub use error::{SearchError, SearchResult};
pub use export::{ExportFormat, EXPORT_FILE_NAME};
pub use fetcher::{Page, PageFetcher};
pub use memory::MemoryBackend;
pub use query::{normalize, normalize_with_case, QueryDescriptor, QueryMode};
pub use session::{SearchSession, SessionRegistry};
pub use store::{
    FetchKind, FetchTicket, Navigation, PagingMode, Received, ResultStore, StoreSnapshot,
    StoreState,
};
pub use walker::{Materialized, RetryPolicy, WalkError, Walker};

use crate::config::{BackendConfig, BackendKind};
use crate::error::{AppError, Result};
use std::sync::Arc;
use tracing::info;

/// Build the backend selected by `config.kind`
pub fn create_backend(config: &BackendConfig) -> Result<Arc<dyn SearchBackend>> {
    match config.kind {
        BackendKind::Elasticsearch => {
            let backend = ElasticsearchBackend::new(config)?;
            info!(url = %config.url, index = %config.index, "Using Elasticsearch backend");
            Ok(Arc::new(backend))
        }
        BackendKind::Memory => {
            if config.memory_files.is_empty() {
                return Err(AppError::Configuration(
                    "backend.memory_files must list at least one file".to_string(),
                ));
            }
            let keep_alive = config.scroll_keep_alive_duration().ok_or_else(|| {
                AppError::Configuration(format!(
                    "backend.scroll_keep_alive '{}' is not a time value",
                    config.scroll_keep_alive
                ))
            })?;
            let backend = MemoryBackend::from_files(&config.memory_files)?
                .with_max_result_window(config.max_result_window)
                .with_scroll_keep_alive(keep_alive);
            info!(
                files = config.memory_files.len(),
                lines = backend.len(),
                "Using in-memory backend"
            );
            Ok(Arc::new(backend))
        }
    }
}
