//! Paginated wildcard search over line-oriented text stored in Elasticsearch.
//!
//! The [`search`] module holds the paging core; [`api`] exposes it over HTTP.

pub mod api;
pub mod config;
pub mod error;
pub mod keepalive;
pub mod metrics;
pub mod search;

pub use error::{AppError, Result};
