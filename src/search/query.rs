//! Query normalization
//!
//! Turns raw user input into an immutable [`QueryDescriptor`]. Empty input
//! never reaches the backend.

use crate::search::error::{SearchError, SearchResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Wildcard marker understood by the backend's wildcard query
pub const WILDCARD: char = '*';

/// How the query text is matched against indexed lines
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QueryMode {
    /// Match the text anywhere inside a line
    #[default]
    Substring,
    /// Match the whole line verbatim
    ExactMatch,
}

/// Backend-agnostic description of one search submission
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryDescriptor {
    raw_text: String,
    mode: QueryMode,
    case_sensitive: bool,
}

impl QueryDescriptor {
    /// Trimmed user text
    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn mode(&self) -> QueryMode {
        self.mode
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Pattern handed to the backend.
    ///
    /// Substring mode wraps the text in wildcard markers unless they are
    /// already present; wildcards typed inside the text are kept so users can
    /// write `foo*bar`.
    pub fn pattern(&self) -> String {
        match self.mode {
            QueryMode::ExactMatch => self.raw_text.clone(),
            QueryMode::Substring => {
                let mut pattern = String::with_capacity(self.raw_text.len() + 2);
                if !self.raw_text.starts_with(WILDCARD) {
                    pattern.push(WILDCARD);
                }
                pattern.push_str(&self.raw_text);
                if !self.raw_text.ends_with(WILDCARD) {
                    pattern.push(WILDCARD);
                }
                pattern
            }
        }
    }

    /// Stable hex digest identifying this query.
    ///
    /// Cursors embed it so a token issued for one query is refused by another.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.mode.to_string().as_bytes());
        hasher.update([0u8, self.case_sensitive as u8, 0u8]);
        hasher.update(self.raw_text.as_bytes());
        let digest = hasher.finalize();
        format!("{:x}", digest)[..16].to_string()
    }
}

/// Build a descriptor from raw input.
///
/// Case-insensitive matching is the default, mirroring how users type
/// fragments of e-mail addresses and hostnames.
pub fn normalize(raw: &str, mode: QueryMode) -> SearchResult<QueryDescriptor> {
    normalize_with_case(raw, mode, false)
}

/// Build a descriptor with explicit case sensitivity
pub fn normalize_with_case(
    raw: &str,
    mode: QueryMode,
    case_sensitive: bool,
) -> SearchResult<QueryDescriptor> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SearchError::InvalidQuery(
            "query must not be empty".to_string(),
        ));
    }

    if mode == QueryMode::Substring && trimmed.chars().all(|c| c == WILDCARD) {
        return Err(SearchError::InvalidQuery(
            "query must contain more than wildcards".to_string(),
        ));
    }

    Ok(QueryDescriptor {
        raw_text: trimmed.to_string(),
        mode,
        case_sensitive,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_whitespace_rejected() {
        for raw in ["", "   ", "\t\n"] {
            let err = normalize(raw, QueryMode::Substring).unwrap_err();
            assert!(matches!(err, SearchError::InvalidQuery(_)));
        }
        assert!(normalize("  ", QueryMode::ExactMatch).is_err());
    }

    #[test]
    fn test_bare_wildcards_rejected() {
        assert!(normalize("**", QueryMode::Substring).is_err());
        // Exact mode looks for a literal line of asterisks
        assert!(normalize("**", QueryMode::ExactMatch).is_ok());
    }

    #[test]
    fn test_substring_wraps_trimmed_text() {
        let q = normalize("  bilkent ", QueryMode::Substring).unwrap();
        assert_eq!(q.raw_text(), "bilkent");
        assert_eq!(q.pattern(), "*bilkent*");
        assert!(!q.case_sensitive());
    }

    #[test]
    fn test_substring_keeps_user_wildcards() {
        let q = normalize("*bilkent*", QueryMode::Substring).unwrap();
        assert_eq!(q.pattern(), "*bilkent*");

        let q = normalize("mail*edu", QueryMode::Substring).unwrap();
        assert_eq!(q.pattern(), "*mail*edu*");
    }

    #[test]
    fn test_exact_match_is_verbatim() {
        let q = normalize_with_case("User@Example.com", QueryMode::ExactMatch, true).unwrap();
        assert_eq!(q.pattern(), "User@Example.com");
        assert!(q.case_sensitive());
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let a = normalize(" foo ", QueryMode::Substring).unwrap();
        let b = normalize("foo", QueryMode::Substring).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_separates_mode_and_case() {
        let sub = normalize("foo", QueryMode::Substring).unwrap();
        let exact = normalize("foo", QueryMode::ExactMatch).unwrap();
        let cased = normalize_with_case("foo", QueryMode::Substring, true).unwrap();
        assert_ne!(sub.fingerprint(), exact.fingerprint());
        assert_ne!(sub.fingerprint(), cased.fingerprint());
        assert_eq!(sub.fingerprint().len(), 16);
    }
}
