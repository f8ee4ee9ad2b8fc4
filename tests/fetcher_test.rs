//! Single-page fetch contract

mod common;

use common::{fetcher, memory_backend, query, records, ScriptedBackend};
use line_search::search::{
    BackendPage, Cursor, NativeCursor, PageFetcher, PagingStrategy, SearchError, SortValue,
};

#[tokio::test]
async fn test_page_size_over_maximum_is_rejected_before_dispatch() {
    let backend = memory_backend(10);
    let fetcher = fetcher(&backend, PagingStrategy::SearchAfter, 10_000);

    let err = fetcher.fetch(&query("bilkent"), None, 20_000).await.unwrap_err();

    assert_eq!(
        err,
        SearchError::PageSizeExceeded {
            requested: 20_000,
            max: 10_000
        }
    );
    assert_eq!(backend.search_calls(), 0);
}

#[tokio::test]
async fn test_zero_page_size_is_invalid() {
    let backend = memory_backend(10);
    let fetcher = fetcher(&backend, PagingStrategy::SearchAfter, 100);

    let err = fetcher.fetch(&query("bilkent"), None, 0).await.unwrap_err();

    assert!(matches!(err, SearchError::InvalidQuery(_)));
    assert_eq!(backend.search_calls(), 0);
}

#[tokio::test]
async fn test_cursor_chain_through_tokens() {
    let backend = memory_backend(5);
    let fetcher = fetcher(&backend, PagingStrategy::SearchAfter, 100);
    let q = query("bilkent");

    let first = fetcher.fetch(&q, None, 2).await.unwrap();
    assert_eq!(first.len(), 2);
    assert!(!first.exhausted);
    assert_eq!(first.total_results, 5);

    let token = first.next_cursor.as_ref().unwrap().token();
    let cursor = Cursor::parse(&token).unwrap();
    let second = fetcher.fetch(&q, Some(&cursor), 2).await.unwrap();
    assert_eq!(second.items[0].line_number, 3);

    let cursor = second.next_cursor.unwrap();
    let last = fetcher.fetch(&q, Some(&cursor), 2).await.unwrap();
    assert_eq!(last.len(), 1);
    assert!(last.exhausted);
    assert!(last.next_cursor.is_none());
}

#[tokio::test]
async fn test_short_page_is_exhausted() {
    let backend = memory_backend(5);
    let fetcher = fetcher(&backend, PagingStrategy::SearchAfter, 100);

    let page = fetcher.fetch(&query("bilkent"), None, 10).await.unwrap();

    assert_eq!(page.len(), 5);
    assert!(page.exhausted);
    assert!(page.next_cursor.is_none());
}

#[tokio::test]
async fn test_cursor_for_another_query_is_rejected() {
    let backend = memory_backend(10);
    let fetcher = fetcher(&backend, PagingStrategy::SearchAfter, 100);

    let first = fetcher.fetch(&query("bilkent"), None, 2).await.unwrap();
    let cursor = first.next_cursor.unwrap();

    let err = fetcher
        .fetch(&query("user1"), Some(&cursor), 2)
        .await
        .unwrap_err();

    assert!(matches!(err, SearchError::MalformedCursor(_)));
    assert_eq!(backend.search_calls(), 1);
}

#[tokio::test]
async fn test_scroll_cursor_is_rejected_by_search_after_fetcher() {
    let backend = memory_backend(10);
    let scroll = fetcher(&backend, PagingStrategy::Scroll, 100);
    let search_after = fetcher(&backend, PagingStrategy::SearchAfter, 100);
    let q = query("bilkent");

    let first = scroll.fetch(&q, None, 2).await.unwrap();
    let cursor = first.next_cursor.unwrap();

    let err = search_after.fetch(&q, Some(&cursor), 2).await.unwrap_err();
    assert!(matches!(err, SearchError::MalformedCursor(_)));

    scroll.abandon(&q, &cursor).await;
    assert_eq!(backend.open_scrolls(), 0);
}

#[tokio::test]
async fn test_garbage_token_is_malformed() {
    for token in ["", "not base64!", "bm90IGpzb24"] {
        assert!(matches!(
            Cursor::parse(token),
            Err(SearchError::MalformedCursor(_))
        ));
    }
}

#[tokio::test]
async fn test_backend_failure_is_unavailable() {
    let backend = memory_backend(10);
    backend.fail_call(1);
    let fetcher = fetcher(&backend, PagingStrategy::SearchAfter, 100);

    let err = fetcher.fetch(&query("bilkent"), None, 5).await.unwrap_err();

    assert!(matches!(err, SearchError::BackendUnavailable(_)));
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn test_exhausted_scroll_page_is_released_by_caller() {
    let backend = memory_backend(5);
    let fetcher = fetcher(&backend, PagingStrategy::Scroll, 100);

    let page = fetcher.fetch(&query("bilkent"), None, 10).await.unwrap();
    assert!(page.exhausted);
    assert_eq!(backend.open_scrolls(), 1);

    fetcher.release(&page).await;
    assert_eq!(backend.open_scrolls(), 0);
}

#[tokio::test]
async fn test_offset_window_is_enforced() {
    let backend = std::sync::Arc::new(
        line_search::search::MemoryBackend::new(common::corpus(500)).with_max_result_window(200),
    );
    let fetcher = PageFetcher::new(backend.clone(), PagingStrategy::SearchAfter, 100).unwrap();

    let err = fetcher
        .fetch_offset(&query("bilkent"), 3, 100)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        SearchError::OffsetWindowExceeded {
            offset: 200,
            page_size: 100,
            max_window: 200
        }
    );
    assert_eq!(backend.search_calls(), 0);

    let err = fetcher.fetch_offset(&query("bilkent"), 0, 100).await.unwrap_err();
    assert!(matches!(err, SearchError::InvalidQuery(_)));
}

#[tokio::test]
async fn test_offset_strategy_cannot_chain_cursors() {
    let backend = memory_backend(1);
    assert!(PageFetcher::new(backend, PagingStrategy::Offset, 100).is_err());
}

#[tokio::test]
async fn test_oversized_page_is_protocol_violation() {
    let backend = ScriptedBackend::new(vec![Ok(BackendPage {
        records: records(3),
        total: 10,
        continuation: Some(NativeCursor::SearchAfter(vec![SortValue::Int(3)])),
    })]);
    let fetcher = PageFetcher::new(backend, PagingStrategy::SearchAfter, 100).unwrap();

    let err = fetcher.fetch(&query("line"), None, 2).await.unwrap_err();

    assert!(matches!(err, SearchError::ProtocolViolation(_)));
    assert!(!err.is_recoverable());
}

#[tokio::test]
async fn test_missing_continuation_is_protocol_violation() {
    let backend = ScriptedBackend::new(vec![Ok(BackendPage {
        records: records(2),
        total: 10,
        continuation: None,
    })]);
    let fetcher = PageFetcher::new(backend, PagingStrategy::SearchAfter, 100).unwrap();

    let err = fetcher.fetch(&query("line"), None, 2).await.unwrap_err();

    assert!(matches!(err, SearchError::ProtocolViolation(_)));
}

#[tokio::test]
async fn test_foreign_continuation_is_protocol_violation() {
    let backend = ScriptedBackend::new(vec![Ok(BackendPage {
        records: records(2),
        total: 10,
        continuation: Some(NativeCursor::Scroll("abc".into())),
    })]);
    let fetcher = PageFetcher::new(backend, PagingStrategy::SearchAfter, 100).unwrap();

    let err = fetcher.fetch(&query("line"), None, 2).await.unwrap_err();

    assert!(matches!(err, SearchError::ProtocolViolation(_)));
}

#[tokio::test]
async fn test_short_page_below_total_is_protocol_violation() {
    let backend = ScriptedBackend::new(vec![Ok(BackendPage {
        records: records(3),
        total: 10,
        continuation: Some(NativeCursor::SearchAfter(vec![SortValue::Int(3)])),
    })]);
    let fetcher = PageFetcher::new(backend, PagingStrategy::SearchAfter, 100).unwrap();

    let err = fetcher.fetch(&query("line"), None, 5).await.unwrap_err();

    assert!(matches!(err, SearchError::ProtocolViolation(_)));
}
