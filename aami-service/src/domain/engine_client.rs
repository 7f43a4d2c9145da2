//! Engine client (§4.4): talks to the metrics engine (Prometheus-compatible) over HTTP.
//!
//! The retry envelope is the same `retry::with_backoff` the database pool connector
//! uses (§4.4 Ambient stack: "generalized ... so the pattern is written once").

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::retry::{with_backoff, BackoffPolicy};

/// Talks to the metrics engine's reload/health/status endpoints (§4.4).
#[derive(Debug, Clone)]
pub struct EngineClient {
    http: reqwest::Client,
    config: EngineConfig,
}

impl EngineClient {
    pub fn new(config: EngineConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.reload_timeout())
            .build()
            .expect("reqwest client build is infallible for this configuration");
        Self { http, config }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.url.trim_end_matches('/'), path)
    }

    fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            self.config.max_attempts,
            self.config.initial_delay(),
            self.config.backoff_multiplier,
        )
    }

    /// `Reload(ctx)` (§4.4): POSTs `/-/reload` under the retry envelope, then requires a
    /// follow-up `HealthCheck` to succeed — a successful POST with a failing health
    /// check is still reported as `HealthCheckFailed`.
    pub async fn reload(&self, cancel: &CancellationToken) -> Result<()> {
        if !self.config.reload_enabled {
            return Err(Error::ConfigInvalid("reload is disabled".to_string()));
        }

        let url = self.url("/-/reload");
        with_backoff(self.backoff_policy(), cancel, || {
            let http = self.http.clone();
            let url = url.clone();
            async move {
                let response = http
                    .post(&url)
                    .send()
                    .await
                    .map_err(|e| Error::ConnectionFailed(e.to_string()))?;
                if !response.status().is_success() {
                    return Err(Error::ReloadFailed(format!("engine returned {}", response.status())));
                }
                Ok(())
            }
        })
        .await?;

        self.health_check(cancel).await.map_err(|e| Error::HealthCheckFailed(e.to_string()))
    }

    /// `HealthCheck(ctx)` (§4.4): GETs `/-/ready`.
    pub async fn health_check(&self, cancel: &CancellationToken) -> Result<()> {
        let url = self.url("/-/ready");
        with_backoff(self.backoff_policy(), cancel, || {
            let http = self.http.clone();
            let url = url.clone();
            async move {
                let response = http
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| Error::ConnectionFailed(e.to_string()))?;
                if response.status().is_success() {
                    Ok(())
                } else {
                    Err(Error::HealthCheckFailed(format!("engine returned {}", response.status())))
                }
            }
        })
        .await
    }

    /// `Ping`/`IsReachable` (§4.4): GETs `/-/healthy`, no retry (a single reachability
    /// probe, not a correctness gate).
    pub async fn ping(&self) -> Result<bool> {
        let url = self.url("/-/healthy");
        match self.http.get(&url).timeout(Duration::from_secs(5)).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// `GetStatus(ctx)` (§4.4): GETs `/api/v1/status/runtimeinfo`, returning the
    /// response body as a freeform map.
    pub async fn get_status(&self) -> Result<HashMap<String, Value>> {
        let url = self.url("/api/v1/status/runtimeinfo");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::ConnectionFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::ConnectionFailed(format!("engine returned {}", response.status())));
        }

        response
            .json::<HashMap<String, Value>>()
            .await
            .map_err(|e| Error::ConnectionFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(url: String) -> EngineConfig {
        EngineConfig {
            url,
            reload_enabled: true,
            reload_timeout_secs: 5,
            max_attempts: 2,
            initial_delay_ms: 1,
            backoff_multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn test_reload_disabled_returns_config_invalid() {
        let mut config = test_config("http://127.0.0.1:1".to_string());
        config.reload_enabled = false;
        let client = EngineClient::new(config);

        let result = client.reload(&CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::ConfigInvalid(_))));
    }

    #[tokio::test]
    async fn test_ping_unreachable_host_returns_false_not_error() {
        let client = EngineClient::new(test_config("http://127.0.0.1:1".to_string()));
        let reachable = client.ping().await.unwrap();
        assert!(!reachable);
    }

    #[tokio::test]
    async fn test_reload_against_unreachable_host_exhausts_retries() {
        let client = EngineClient::new(test_config("http://127.0.0.1:1".to_string()));
        let result = client.reload(&CancellationToken::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_reload_respects_cancellation() {
        let client = EngineClient::new(test_config("http://127.0.0.1:1".to_string()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = client.reload(&cancel).await;
        assert!(result.is_err());
    }
}
