//! In-memory search backend (for local development and testing)
//!
//! Holds line records in memory and emulates the three Elasticsearch paging
//! styles closely enough to exercise the paging core: scroll sessions with
//! server-side state, sort-tuple continuation, and from/size windows.

use crate::search::backend::{
    BackendPage, BackendRequest, PagePosition, PagingStrategy, ResultRecord, SearchBackend,
};
use crate::search::cursor::{NativeCursor, SortValue};
use crate::search::error::{SearchError, SearchResult};
use crate::search::query::{QueryDescriptor, QueryMode};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Idle time after which an unreleased scroll context is dropped
const DEFAULT_SCROLL_KEEP_ALIVE: Duration = Duration::from_secs(300);

#[derive(Debug)]
struct ScrollState {
    matches: Vec<usize>,
    offset: usize,
    last_used: Instant,
}

/// In-memory [`SearchBackend`]
pub struct MemoryBackend {
    records: Vec<ResultRecord>,
    max_result_window: u64,
    scroll_keep_alive: Duration,
    scrolls: Mutex<HashMap<String, ScrollState>>,
    calls: AtomicUsize,
    failing_calls: Mutex<HashSet<usize>>,
    latency: Mutex<Duration>,
    healthy: AtomicBool,
}

impl MemoryBackend {
    /// Create a backend over `records`, kept in (line_number, file) order
    pub fn new(mut records: Vec<ResultRecord>) -> Self {
        records.sort_by(|a, b| {
            a.line_number
                .cmp(&b.line_number)
                .then_with(|| a.source_file.cmp(&b.source_file))
        });

        Self {
            records,
            max_result_window: 10_000,
            scroll_keep_alive: DEFAULT_SCROLL_KEEP_ALIVE,
            scrolls: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            failing_calls: Mutex::new(HashSet::new()),
            latency: Mutex::new(Duration::ZERO),
            healthy: AtomicBool::new(true),
        }
    }

    /// Load line files the way the bulk indexer stores them: one record per
    /// non-blank line, trimmed, numbered from 1 in file order.
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> std::io::Result<Self> {
        let mut records = Vec::new();
        for path in paths {
            let path = path.as_ref();
            let bytes = std::fs::read(path)?;
            let text = match String::from_utf8(bytes) {
                Ok(text) => text,
                // ISO-8859-1 maps every byte to the code point of the same value
                Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
            };
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "unknown".to_string());

            for (index, line) in text.lines().enumerate() {
                let content = line.trim();
                if content.is_empty() {
                    continue;
                }
                records.push(ResultRecord::new(content, file_name.clone(), index as u64 + 1));
            }
        }

        tracing::info!(records = records.len(), files = paths.len(), "Loaded in-memory index");
        Ok(Self::new(records))
    }

    /// Override the from/size window
    pub fn with_max_result_window(mut self, window: u64) -> Self {
        self.max_result_window = window;
        self
    }

    /// Drop scroll contexts left idle for longer than `keep_alive`
    pub fn with_scroll_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.scroll_keep_alive = keep_alive;
        self
    }

    /// Make the `n`-th search call (1-based) fail as unavailable
    pub fn fail_call(&self, n: usize) {
        self.failing_calls.lock().insert(n);
    }

    /// Delay every search call
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Number of search calls received so far
    pub fn search_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Scroll sessions not yet released
    pub fn open_scrolls(&self) -> usize {
        self.scrolls.lock().len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn matching(&self, query: &QueryDescriptor) -> Vec<usize> {
        let fold = !query.case_sensitive();
        let pattern: Vec<char> = fold_case(&query.pattern(), fold).chars().collect();

        self.records
            .iter()
            .enumerate()
            .filter(|(_, record)| {
                let content = fold_case(&record.content, fold);
                match query.mode() {
                    QueryMode::Substring => {
                        wildcard_match(&pattern, &content.chars().collect::<Vec<_>>())
                    }
                    QueryMode::ExactMatch => content.chars().eq(pattern.iter().copied()),
                }
            })
            .map(|(index, _)| index)
            .collect()
    }

    fn sort_key(&self, index: usize) -> Vec<SortValue> {
        let record = &self.records[index];
        vec![
            SortValue::Int(record.line_number as i64),
            SortValue::Text(record.source_file.clone()),
            SortValue::Int(index as i64),
        ]
    }

    fn collect(&self, indices: &[usize]) -> Vec<ResultRecord> {
        indices.iter().map(|&i| self.records[i].clone()).collect()
    }

    fn page_scroll(&self, request: &BackendRequest) -> SearchResult<BackendPage> {
        let now = Instant::now();
        let mut scrolls = self.scrolls.lock();
        let before = scrolls.len();
        scrolls.retain(|_, state| now.duration_since(state.last_used) <= self.scroll_keep_alive);
        if scrolls.len() < before {
            tracing::debug!(expired = before - scrolls.len(), "Dropped idle scroll contexts");
        }

        let (id, state) = match &request.position {
            PagePosition::Start => {
                let id = Uuid::new_v4().to_string();
                let state = ScrollState {
                    matches: self.matching(&request.query),
                    offset: 0,
                    last_used: now,
                };
                scrolls.insert(id.clone(), state);
                let state = scrolls.get_mut(&id).ok_or_else(|| {
                    SearchError::BackendUnavailable("scroll registry lost an entry".to_string())
                })?;
                (id, state)
            }
            PagePosition::After(NativeCursor::Scroll(id)) => {
                let state = scrolls.get_mut(id).ok_or_else(|| {
                    SearchError::MalformedCursor("scroll context expired".to_string())
                })?;
                (id.clone(), state)
            }
            other => {
                return Err(SearchError::MalformedCursor(format!(
                    "{:?} cannot be used with scroll paging",
                    other
                )))
            }
        };

        let end = (state.offset + request.size).min(state.matches.len());
        let slice = state.matches[state.offset..end].to_vec();
        state.offset = end;
        state.last_used = now;
        let total = state.matches.len() as u64;

        Ok(BackendPage {
            records: self.collect(&slice),
            total,
            continuation: Some(NativeCursor::Scroll(id)),
        })
    }

    fn page_search_after(&self, request: &BackendRequest) -> SearchResult<BackendPage> {
        let matches = self.matching(&request.query);
        let start = match &request.position {
            PagePosition::Start => 0,
            PagePosition::After(NativeCursor::SearchAfter(values)) => {
                let after = match values.last() {
                    Some(SortValue::Int(index)) if *index >= 0 => *index as usize,
                    _ => {
                        return Err(SearchError::ProtocolViolation(
                            "sort tuple does not end with a document index".to_string(),
                        ))
                    }
                };
                matches.partition_point(|&i| i <= after)
            }
            other => {
                return Err(SearchError::MalformedCursor(format!(
                    "{:?} cannot be used with search_after paging",
                    other
                )))
            }
        };

        let end = (start + request.size).min(matches.len());
        let slice = &matches[start..end];

        Ok(BackendPage {
            records: self.collect(slice),
            total: matches.len() as u64,
            continuation: slice
                .last()
                .map(|&i| NativeCursor::SearchAfter(self.sort_key(i))),
        })
    }

    fn page_offset(&self, request: &BackendRequest) -> SearchResult<BackendPage> {
        let from = match &request.position {
            PagePosition::Offset(from) => *from,
            other => {
                return Err(SearchError::MalformedCursor(format!(
                    "{:?} cannot be used with offset paging",
                    other
                )))
            }
        };
        if from.saturating_add(request.size as u64) > self.max_result_window {
            return Err(SearchError::ProtocolViolation(
                "result window is too large".to_string(),
            ));
        }

        let matches = self.matching(&request.query);
        let start = (from as usize).min(matches.len());
        let end = (start + request.size).min(matches.len());

        Ok(BackendPage {
            records: self.collect(&matches[start..end]),
            total: matches.len() as u64,
            continuation: None,
        })
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

fn fold_case(text: &str, fold: bool) -> String {
    if fold {
        text.to_lowercase()
    } else {
        text.to_string()
    }
}

/// Wildcard match where `*` spans any run of characters and `?` exactly one
fn wildcard_match(pattern: &[char], text: &[char]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<usize> = None;
    let mut resume = 0;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            resume = t;
            p += 1;
        } else if let Some(s) = star {
            p = s + 1;
            resume += 1;
            t = resume;
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

#[async_trait]
impl SearchBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn max_result_window(&self) -> u64 {
        self.max_result_window
    }

    async fn search(&self, request: &BackendRequest) -> SearchResult<BackendPage> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if self.failing_calls.lock().contains(&call) {
            return Err(SearchError::BackendUnavailable(format!(
                "injected failure on call {}",
                call
            )));
        }

        match request.strategy {
            PagingStrategy::Scroll => self.page_scroll(request),
            PagingStrategy::SearchAfter => self.page_search_after(request),
            PagingStrategy::Offset => self.page_offset(request),
        }
    }

    async fn ping(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    async fn release(&self, cursor: &NativeCursor) -> SearchResult<()> {
        if let NativeCursor::Scroll(id) = cursor {
            self.scrolls.lock().remove(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::query::{normalize, normalize_with_case};
    use tempfile::TempDir;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match(&chars("*bilkent*"), &chars("ali@bilkent.edu.tr")));
        assert!(wildcard_match(&chars("*"), &chars("")));
        assert!(wildcard_match(&chars("a?c"), &chars("abc")));
        assert!(wildcard_match(&chars("*a*b*"), &chars("xxaxxbxx")));
        assert!(!wildcard_match(&chars("*bilkent*"), &chars("metu.edu.tr")));
        assert!(!wildcard_match(&chars("a?c"), &chars("ac")));
    }

    #[tokio::test]
    async fn test_case_folding() {
        let backend = MemoryBackend::new(vec![
            ResultRecord::new("Admin@Bilkent.edu.tr", "a.txt", 1),
            ResultRecord::new("guest@metu.edu.tr", "a.txt", 2),
        ]);

        let insensitive = normalize("bilkent", QueryMode::Substring).unwrap();
        assert_eq!(backend.matching(&insensitive), vec![0]);

        let sensitive = normalize_with_case("bilkent", QueryMode::Substring, true).unwrap();
        assert!(backend.matching(&sensitive).is_empty());

        let exact = normalize("admin@bilkent.edu.tr", QueryMode::ExactMatch).unwrap();
        assert_eq!(backend.matching(&exact), vec![0]);
    }

    #[test]
    fn test_from_files_numbers_lines_and_skips_blanks() {
        let dir = TempDir::new().unwrap();
        let utf8 = dir.path().join("dump.txt");
        std::fs::write(&utf8, "first\n\n  third  \n").unwrap();
        let latin1 = dir.path().join("legacy.txt");
        std::fs::write(&latin1, [b'c', b'a', 0xE7, b'a', b'\n']).unwrap();

        let backend = MemoryBackend::from_files(&[utf8, latin1]).unwrap();

        assert_eq!(backend.len(), 3);
        assert!(backend
            .records
            .contains(&ResultRecord::new("third", "dump.txt", 3)));
        assert!(backend
            .records
            .contains(&ResultRecord::new("ca\u{e7}a", "legacy.txt", 1)));
    }

    #[tokio::test]
    async fn test_idle_scroll_contexts_expire() {
        let backend = MemoryBackend::new(
            (1..=5)
                .map(|i| ResultRecord::new(format!("user{}@bilkent.edu.tr", i), "a.txt", i))
                .collect(),
        )
        .with_scroll_keep_alive(Duration::from_millis(20));
        let start = BackendRequest {
            query: normalize("bilkent", QueryMode::Substring).unwrap(),
            strategy: PagingStrategy::Scroll,
            position: PagePosition::Start,
            size: 2,
        };

        let first = backend.search(&start).await.unwrap();
        assert_eq!(backend.open_scrolls(), 1);
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Opening another scroll sweeps the idle one
        backend.search(&start).await.unwrap();
        assert_eq!(backend.open_scrolls(), 1);

        let resume = BackendRequest {
            position: PagePosition::After(first.continuation.unwrap()),
            ..start
        };
        let err = backend.search(&resume).await.unwrap_err();
        assert!(matches!(err, SearchError::MalformedCursor(_)));
    }
}
