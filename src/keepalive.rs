//! Background liveness ping
//!
//! Keeps a hosted deployment awake by touching a URL (or the search backend)
//! on a fixed interval. Shares no state with searches; the only side effects
//! are a log line and the backend-up gauge.

use crate::config::KeepaliveConfig;
use crate::error::{AppError, Result};
use crate::metrics;
use crate::search::SearchBackend;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

enum PingTarget {
    Url {
        client: reqwest::Client,
        url: String,
    },
    Backend(Arc<dyn SearchBackend>),
}

/// Periodic liveness pinger
pub struct Keepalive {
    target: PingTarget,
    interval: Duration,
}

impl Keepalive {
    /// Build a pinger for `config`; pings `backend` when no URL is configured
    pub fn new(config: &KeepaliveConfig, backend: Arc<dyn SearchBackend>) -> Result<Self> {
        if config.interval_secs == 0 {
            return Err(AppError::Configuration(
                "keepalive.interval_secs must be positive".to_string(),
            ));
        }

        let target = match &config.url {
            Some(url) => {
                let client = reqwest::Client::builder()
                    .timeout(Duration::from_secs(30))
                    .user_agent(concat!("line-search-keepalive/", env!("CARGO_PKG_VERSION")))
                    .build()
                    .map_err(|e| AppError::Configuration(format!("keepalive client: {}", e)))?;
                PingTarget::Url {
                    client,
                    url: url.clone(),
                }
            }
            None => PingTarget::Backend(backend),
        };

        Ok(Self {
            target,
            interval: Duration::from_secs(config.interval_secs),
        })
    }

    /// Spawn the loop if keepalive is enabled
    pub fn spawn(
        config: &KeepaliveConfig,
        backend: Arc<dyn SearchBackend>,
    ) -> Result<Option<JoinHandle<()>>> {
        if !config.enabled {
            return Ok(None);
        }
        let keepalive = Self::new(config, backend)?;
        Ok(Some(tokio::spawn(keepalive.run())))
    }

    /// Ping once and record the outcome
    pub async fn ping_once(&self) -> bool {
        let up = match &self.target {
            PingTarget::Url { client, url } => match client.get(url).send().await {
                Ok(response) if response.status().is_success() => true,
                Ok(response) => {
                    tracing::warn!(url = %url, status = %response.status(), "Keepalive ping rejected");
                    false
                }
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Keepalive ping failed");
                    false
                }
            },
            PingTarget::Backend(backend) => backend.ping().await,
        };

        if matches!(self.target, PingTarget::Backend(_)) {
            metrics::BACKEND_UP.set(if up { 1.0 } else { 0.0 });
        }
        tracing::info!(up, "Keepalive ping");
        up
    }

    /// Run the ping loop forever
    pub async fn run(self) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Starting keepalive loop"
        );

        loop {
            self.ping_once().await;
            sleep(self.interval).await;
        }
    }
}
