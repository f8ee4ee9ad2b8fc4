//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use line_search::search::{
    normalize, BackendPage, BackendRequest, MemoryBackend, PageFetcher, PagingStrategy,
    QueryDescriptor, QueryMode, ResultRecord, SearchBackend, SearchError, SearchResult,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// `n` credential lines, one per line number, all matching `bilkent`
pub fn corpus(n: u64) -> Vec<ResultRecord> {
    (1..=n)
        .map(|i| ResultRecord::new(format!("user{}@bilkent.edu.tr:pw{}", i, i), "combo.txt", i))
        .collect()
}

pub fn memory_backend(n: u64) -> Arc<MemoryBackend> {
    Arc::new(MemoryBackend::new(corpus(n)))
}

pub fn fetcher(backend: &Arc<MemoryBackend>, strategy: PagingStrategy, max_page_size: usize) -> PageFetcher {
    PageFetcher::new(backend.clone(), strategy, max_page_size).unwrap()
}

pub fn query(text: &str) -> QueryDescriptor {
    normalize(text, QueryMode::Substring).unwrap()
}

/// Line numbers of `records` must be exactly 1..=n in order
pub fn assert_contiguous(records: &[ResultRecord], n: u64) {
    let lines: Vec<u64> = records.iter().map(|r| r.line_number).collect();
    let expected: Vec<u64> = (1..=n).collect();
    assert_eq!(lines, expected);
}

/// `n` records of a plain text dump
pub fn records(n: u64) -> Vec<ResultRecord> {
    (1..=n)
        .map(|i| ResultRecord::new(format!("line {}", i), "dump.txt", i))
        .collect()
}

/// Backend answering with pre-recorded pages
pub struct ScriptedBackend {
    pages: Mutex<VecDeque<SearchResult<BackendPage>>>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(pages: Vec<SearchResult<BackendPage>>) -> Arc<Self> {
        Arc::new(Self {
            pages: Mutex::new(pages.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn max_result_window(&self) -> u64 {
        10_000
    }

    async fn search(&self, _request: &BackendRequest) -> SearchResult<BackendPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pages
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(SearchError::BackendUnavailable("script exhausted".into())))
    }

    async fn ping(&self) -> bool {
        true
    }
}
