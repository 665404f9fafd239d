//! reqwest-backed prober for the warmed metadata API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{HealthReport, ProbeError, ProbeOutcome, ProbeTarget, Prober};
use crate::config::ProbeConfig;

/// Prober issuing plain GET requests; only the status code is inspected.
pub struct HttpProber {
    client: Client,
    base_url: String,
}

impl HttpProber {
    pub fn new(config: &ProbeConfig) -> Result<Self, ProbeError> {
        let client = Client::builder()
            .user_agent(format!("lidarr-cache-warmer/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProbeError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.target_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET the API root. The API counts as available when it answers below 500.
    pub async fn health_check(&self) -> HealthReport {
        let started = Instant::now();
        let result = self.client.get(&self.base_url).send().await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                debug!(status, latency_ms, "Target API health check");
                HealthReport {
                    available: status < 500,
                    status_code: Some(status),
                    latency_ms,
                    error: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "Target API health check failed");
                HealthReport {
                    available: false,
                    status_code: None,
                    latency_ms,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// Short failure kind for a transport error.
fn error_kind(error: &reqwest::Error) -> &'static str {
    if error.is_connect() {
        "connect"
    } else if error.is_redirect() {
        "redirect"
    } else if error.is_body() || error.is_decode() {
        "body"
    } else if error.is_request() {
        "request"
    } else {
        "other"
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, target: &ProbeTarget) -> ProbeOutcome {
        let url = target.url(&self.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                // Drain the body so the connection can be reused.
                let _ = response.bytes().await;
                ProbeOutcome::Status(status)
            }
            Err(e) if e.is_timeout() => ProbeOutcome::Timeout,
            Err(e) => {
                debug!(url = %url, error = %e, "Probe request failed");
                ProbeOutcome::ConnectionError(error_kind(&e).to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trims_base_url() {
        let config = ProbeConfig {
            target_base_url: "https://api.example.test/v1/".to_string(),
            ..ProbeConfig::default()
        };
        let prober = HttpProber::new(&config).unwrap();
        assert_eq!(prober.base_url(), "https://api.example.test/v1");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_connection_error() {
        let config = ProbeConfig {
            target_base_url: "http://127.0.0.1:1".to_string(),
            timeout_secs: 2,
            ..ProbeConfig::default()
        };
        let prober = HttpProber::new(&config).unwrap();

        let outcome = prober.probe(&ProbeTarget::artist("abc")).await;
        assert!(matches!(
            outcome,
            ProbeOutcome::ConnectionError(_) | ProbeOutcome::Timeout
        ));

        let health = prober.health_check().await;
        assert!(!health.available);
        assert!(health.error.is_some());
    }

    #[tokio::test]
    async fn test_probe_reports_status_codes() {
        use crate::testing::{StubResponse, StubServer};

        let server = StubServer::start(vec![
            ("/artist/a1".to_string(), StubResponse::json(200, "{}")),
            ("/album/rg1".to_string(), StubResponse::status(503)),
            ("/search".to_string(), StubResponse::json(200, "[]")),
        ])
        .await
        .unwrap();
        let config = ProbeConfig {
            target_base_url: server.url(),
            ..ProbeConfig::default()
        };
        let prober = HttpProber::new(&config).unwrap();

        assert!(prober.probe(&ProbeTarget::artist("a1")).await.is_success());
        assert_eq!(
            prober.probe(&ProbeTarget::release_group("rg1")).await,
            ProbeOutcome::Status(503)
        );
        assert_eq!(
            prober.probe(&ProbeTarget::artist("missing")).await,
            ProbeOutcome::Status(404)
        );
        assert!(prober
            .probe(&ProbeTarget::text_search("Sigur Rós"))
            .await
            .is_success());

        let requests = server.requests().await;
        let search = requests.iter().find(|r| r.path == "/search").unwrap();
        assert_eq!(
            search.query.as_deref(),
            Some("type=all&query=Sigur%20R%C3%B3s")
        );
        assert!(search
            .header("user-agent")
            .unwrap()
            .starts_with("lidarr-cache-warmer/"));

        assert!(prober.health_check().await.available);
    }
}
