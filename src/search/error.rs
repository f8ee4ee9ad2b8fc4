//! Error types for search operations

use crate::error::AppError;

/// Result type for search operations
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Errors that can occur while paging through a backend result set
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SearchError {
    /// User input rejected before any network call
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Requested page size is larger than a single backend request allows
    #[error("Page size {requested} exceeds the backend maximum of {max}")]
    PageSizeExceeded { requested: usize, max: usize },

    /// Offset paging asked for a window the backend refuses to serve
    #[error("Offset {offset} + page size {page_size} exceeds the result window of {max_window}")]
    OffsetWindowExceeded {
        offset: u64,
        page_size: usize,
        max_window: u64,
    },

    /// Continuation token could not be decoded or belongs to another query
    #[error("Malformed cursor: {0}")]
    MalformedCursor(String),

    /// Network or backend fault (timeout, 5xx, connection failure)
    #[error("Search backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Backend answered with a page that breaks the paging contract
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),
}

impl SearchError {
    /// Whether the caller can recover by re-prompting, clamping or retrying.
    ///
    /// Protocol violations are fatal to the walk that observed them.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SearchError::ProtocolViolation(_))
    }

    /// Only transport faults are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SearchError::BackendUnavailable(_))
    }

    /// Stable label for metrics and error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            SearchError::InvalidQuery(_) => "invalid_query",
            SearchError::PageSizeExceeded { .. } => "page_size_exceeded",
            SearchError::OffsetWindowExceeded { .. } => "offset_window_exceeded",
            SearchError::MalformedCursor(_) => "malformed_cursor",
            SearchError::BackendUnavailable(_) => "backend_unavailable",
            SearchError::ProtocolViolation(_) => "protocol_violation",
        }
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SearchError::BackendUnavailable(format!("request timed out: {}", err))
        } else if err.is_connect() {
            SearchError::BackendUnavailable(format!("connection failed: {}", err))
        } else if err.is_decode() {
            SearchError::ProtocolViolation(format!("undecodable response: {}", err))
        } else {
            SearchError::BackendUnavailable(err.to_string())
        }
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        AppError::Search(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverability() {
        assert!(SearchError::InvalidQuery("empty".into()).is_recoverable());
        assert!(SearchError::BackendUnavailable("down".into()).is_recoverable());
        assert!(SearchError::MalformedCursor("bad".into()).is_recoverable());
        assert!(!SearchError::ProtocolViolation("empty page".into()).is_recoverable());
    }

    #[test]
    fn test_only_backend_faults_retry() {
        assert!(SearchError::BackendUnavailable("503".into()).is_retryable());
        assert!(!SearchError::PageSizeExceeded { requested: 20_000, max: 10_000 }.is_retryable());
        assert!(!SearchError::ProtocolViolation("x".into()).is_retryable());
    }

    #[test]
    fn test_display() {
        let err = SearchError::PageSizeExceeded {
            requested: 20_000,
            max: 10_000,
        };
        assert_eq!(
            err.to_string(),
            "Page size 20000 exceeds the backend maximum of 10000"
        );
    }
}
