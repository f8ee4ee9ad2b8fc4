use crate::search::PagingStrategy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Search backend transport
    #[serde(default)]
    pub backend: BackendConfig,

    /// Paging limits and walk policy
    #[serde(default)]
    pub search: SearchSettings,

    /// Interactive session configuration
    #[serde(default)]
    pub sessions: SessionConfig,

    /// Background liveness ping
    #[serde(default)]
    pub keepalive: KeepaliveConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/line-search.toml".to_string());

        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (LINE_SEARCH__SECTION__KEY)
            .add_source(
                config::Environment::with_prefix("LINE_SEARCH")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("backend.sort_fields")
                    .with_list_parse_key("backend.memory_files")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            backend: BackendConfig::default(),
            search: SearchSettings::default(),
            sessions: SessionConfig::default(),
            keepalive: KeepaliveConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Elasticsearch,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend type
    #[serde(default)]
    pub kind: BackendKind,

    /// Elasticsearch base URL
    #[serde(default = "default_backend_url")]
    pub url: String,

    /// Index or index pattern searched
    #[serde(default = "default_index")]
    pub index: String,

    /// Basic auth user
    pub username: Option<String>,

    /// Name of the env var holding the basic auth password
    pub password_env: Option<String>,

    /// Verify the backend TLS certificate
    #[serde(default = "default_true")]
    pub verify_tls: bool,

    /// Extra PEM root certificate for self-signed clusters
    pub ca_cert: Option<PathBuf>,

    /// Per-request timeout (seconds)
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,

    /// Analyzed field holding the line text
    #[serde(default = "default_content_field")]
    pub content_field: String,

    /// Keyword field used for exact matches
    #[serde(default = "default_exact_field")]
    pub exact_field: String,

    /// Sort keys for search_after and offset paging
    #[serde(default = "default_sort_fields")]
    pub sort_fields: Vec<String>,

    /// Scroll context lifetime
    #[serde(default = "default_scroll_keep_alive")]
    pub scroll_keep_alive: String,

    /// index.max_result_window of the searched indices
    #[serde(default = "default_max_result_window")]
    pub max_result_window: u64,

    /// Line files loaded by the in-memory backend
    #[serde(default)]
    pub memory_files: Vec<PathBuf>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            url: default_backend_url(),
            index: default_index(),
            username: None,
            password_env: None,
            verify_tls: true,
            ca_cert: None,
            timeout_secs: default_backend_timeout(),
            content_field: default_content_field(),
            exact_field: default_exact_field(),
            sort_fields: default_sort_fields(),
            scroll_keep_alive: default_scroll_keep_alive(),
            max_result_window: default_max_result_window(),
            memory_files: Vec::new(),
        }
    }
}

impl BackendConfig {
    /// `scroll_keep_alive` as a duration (Elasticsearch time units)
    pub fn scroll_keep_alive_duration(&self) -> Option<Duration> {
        parse_time_value(&self.scroll_keep_alive)
    }
}

/// Parse an Elasticsearch time value such as `5m`, `30s` or `250ms`
fn parse_time_value(value: &str) -> Option<Duration> {
    let value = value.trim();
    let split = value.find(|c: char| !c.is_ascii_digit())?;
    let (amount, unit) = value.split_at(split);
    let amount: u64 = amount.parse().ok()?;

    let secs = match unit {
        "ms" => return Some(Duration::from_millis(amount)),
        "s" => amount,
        "m" => amount.checked_mul(60)?,
        "h" => amount.checked_mul(3_600)?,
        "d" => amount.checked_mul(86_400)?,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Strategy used for cursor paging
    #[serde(default)]
    pub cursor_strategy: PagingStrategy,

    /// Page size when the caller gives none
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    /// Largest single backend request
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,

    /// Page size used by full materialization
    #[serde(default = "default_walk_page_size")]
    pub walk_page_size: usize,

    /// Stop materializing after this many records
    #[serde(default = "default_max_total_results")]
    pub max_total_results: u64,

    /// Retry a failed page once before aborting a walk
    #[serde(default)]
    pub retry_enabled: bool,

    /// Delay before the retry (milliseconds)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            cursor_strategy: PagingStrategy::default(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            walk_page_size: default_walk_page_size(),
            max_total_results: default_max_total_results(),
            retry_enabled: false,
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Drop sessions idle for this long (seconds)
    #[serde(default = "default_session_idle")]
    pub idle_timeout_secs: u64,

    /// Maximum live sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_session_idle(),
            max_sessions: default_max_sessions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeepaliveConfig {
    /// Enable the liveness ping
    #[serde(default)]
    pub enabled: bool,

    /// Ping interval (seconds)
    #[serde(default = "default_keepalive_interval")]
    pub interval_secs: u64,

    /// URL to ping instead of the backend
    pub url: Option<String>,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_keepalive_interval(),
            url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            prometheus_enabled: true,
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8501
}

fn default_request_timeout() -> u64 {
    300
}

fn default_backend_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_index() -> String {
    "leaks-*".to_string()
}

fn default_backend_timeout() -> u64 {
    120
}

fn default_content_field() -> String {
    "content".to_string()
}

fn default_exact_field() -> String {
    "content.keyword".to_string()
}

fn default_sort_fields() -> Vec<String> {
    vec!["line_number".to_string(), "file_name".to_string()]
}

fn default_scroll_keep_alive() -> String {
    "5m".to_string()
}

fn default_max_result_window() -> u64 {
    10_000
}

fn default_page_size() -> usize {
    100
}

fn default_max_page_size() -> usize {
    10_000
}

fn default_walk_page_size() -> usize {
    5_000
}

fn default_max_total_results() -> u64 {
    1_000_000
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_session_idle() -> u64 {
    1_200 // 20 minutes
}

fn default_max_sessions() -> u64 {
    2_000
}

fn default_keepalive_interval() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        assert_eq!(default_http_port(), 8501);
        assert_eq!(default_max_page_size(), 10_000);
        assert_eq!(default_walk_page_size(), 5_000);
        assert_eq!(default_log_level(), "info");
        assert!(default_true());
    }

    #[test]
    fn test_backend_defaults() {
        let backend = BackendConfig::default();
        assert_eq!(backend.kind, BackendKind::Elasticsearch);
        assert_eq!(backend.index, "leaks-*");
        assert_eq!(backend.sort_fields, vec!["line_number", "file_name"]);
        assert_eq!(backend.scroll_keep_alive, "5m");
    }

    #[test]
    fn test_scroll_keep_alive_units() {
        assert_eq!(parse_time_value("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_time_value("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_time_value("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_time_value("1h"), Some(Duration::from_secs(3_600)));
        assert_eq!(parse_time_value("5"), None);
        assert_eq!(parse_time_value("m"), None);
        assert_eq!(parse_time_value("5 weeks"), None);
        assert_eq!(
            BackendConfig::default().scroll_keep_alive_duration(),
            Some(Duration::from_secs(300))
        );
    }

    #[test]
    fn test_embedded_defaults_parse() {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.search.cursor_strategy, PagingStrategy::SearchAfter);
        assert_eq!(config.sessions.idle_timeout_secs, 1_200);
        assert!(!config.keepalive.enabled);
    }
}
