//! HTTP client for the carbon-intensity feed.
//!
//! Issues `GET {base_url}{region}` with an `auth-token` header and parses
//! a JSON body containing a numeric `carbonIntensity` field. Transport
//! errors and 5xx responses are retried with a fixed delay; 4xx responses
//! fail immediately.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use gridgate_core::{CarbonReading, Clock};

use crate::error::{SignalError, SignalResult};
use crate::limiter::RateLimiter;

/// Client tuning, mapped from the `API_*` configuration surface.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL; the region is appended verbatim.
    pub base_url: String,
    /// Upstream auth token, sent in the `auth-token` header.
    pub api_key: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Total attempts per fetch (first try included).
    pub max_retries: u32,
    /// Sleep between attempts.
    pub retry_delay: Duration,
    /// Requests per minute across all callers.
    pub rate_limit: usize,
}

/// Anything that can produce a fresh [`CarbonReading`] for a region.
///
/// The cache and the engine depend on this seam rather than on the HTTP
/// client directly, so tests can substitute an in-process source.
#[async_trait]
pub trait CarbonSource: Send + Sync {
    async fn fetch(&self, region: &str, cancel: &CancellationToken) -> SignalResult<CarbonReading>;
}

/// Expected shape of the upstream response; extra fields are ignored.
#[derive(Debug, Deserialize)]
struct IntensityBody {
    #[serde(rename = "carbonIntensity")]
    carbon_intensity: f64,
}

/// reqwest-backed [`CarbonSource`].
pub struct CarbonClient {
    http: reqwest::Client,
    config: ClientConfig,
    limiter: RateLimiter,
    clock: Arc<dyn Clock>,
}

impl CarbonClient {
    /// Build a client from config.
    ///
    /// Fails only if the underlying HTTP client cannot be constructed.
    pub fn new(config: ClientConfig, clock: Arc<dyn Clock>) -> SignalResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SignalError::Transport(e.to_string()))?;
        let limiter = RateLimiter::per_minute(config.rate_limit);
        Ok(Self {
            http,
            config,
            limiter,
            clock,
        })
    }

    async fn attempt(&self, url: &str, region: &str) -> SignalResult<CarbonReading> {
        let response = self
            .http
            .get(url)
            .header("auth-token", &self.config.api_key)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SignalError::Timeout(self.config.timeout)
                } else {
                    SignalError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_client_error() {
            return Err(SignalError::AuthOrClient {
                status: status.as_u16(),
                message: format!("unexpected status for region {region}"),
            });
        }
        if !status.is_success() {
            return Err(SignalError::Transport(format!(
                "upstream returned status {status}"
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SignalError::Transport(e.to_string()))?;
        let body: IntensityBody =
            serde_json::from_slice(&bytes).map_err(|e| SignalError::Protocol(e.to_string()))?;
        if !body.carbon_intensity.is_finite() || body.carbon_intensity < 0.0 {
            return Err(SignalError::Protocol(format!(
                "carbonIntensity {} is out of range",
                body.carbon_intensity
            )));
        }

        Ok(CarbonReading {
            region: region.to_string(),
            intensity: body.carbon_intensity,
            observed_at: self.clock.now(),
        })
    }
}

#[async_trait]
impl CarbonSource for CarbonClient {
    async fn fetch(&self, region: &str, cancel: &CancellationToken) -> SignalResult<CarbonReading> {
        let url = format!("{}{}", self.config.base_url, region);
        let attempts = self.config.max_retries.max(1);

        for attempt in 1..=attempts {
            let deadline = Instant::now() + self.config.timeout;
            tokio::select! {
                _ = cancel.cancelled() => return Err(SignalError::Canceled),
                slot = self.limiter.acquire(deadline) => slot?,
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(SignalError::Canceled),
                r = self.attempt(&url, region) => r,
            };

            match result {
                Ok(reading) => {
                    debug!(
                        region,
                        intensity = reading.intensity,
                        attempt,
                        "fetched carbon intensity"
                    );
                    return Ok(reading);
                }
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(region, attempt, error = %e, "carbon fetch failed, retrying");
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(SignalError::Canceled),
                        _ = tokio::time::sleep(self.config.retry_delay) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }

        // Unreachable: the loop always returns on its final attempt.
        Err(SignalError::Transport("no attempts made".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicU32, Ordering};

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use chrono::{TimeZone, Utc};
    use gridgate_core::MockClock;

    struct Upstream {
        addr: SocketAddr,
        hits: Arc<AtomicU32>,
    }

    /// Spin up a local upstream returning `responses` in order (repeating
    /// the last one once exhausted).
    async fn upstream(responses: Vec<(StatusCode, &'static str)>) -> Upstream {
        let hits = Arc::new(AtomicU32::new(0));
        let state = (Arc::clone(&hits), Arc::new(responses));

        async fn handler(
            State((hits, responses)): State<(Arc<AtomicU32>, Arc<Vec<(StatusCode, &'static str)>>)>,
            headers: HeaderMap,
        ) -> (StatusCode, String) {
            assert!(headers.contains_key("auth-token"));
            let n = hits.fetch_add(1, Ordering::SeqCst) as usize;
            let (status, body) = responses[n.min(responses.len() - 1)];
            (status, body.to_string())
        }

        let app = Router::new()
            .route("/carbon/:region", get(handler))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Upstream { addr, hits }
    }

    fn client(addr: SocketAddr, max_retries: u32) -> CarbonClient {
        let clock = Arc::new(MockClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        ));
        CarbonClient::new(
            ClientConfig {
                base_url: format!("http://{addr}/carbon/"),
                api_key: "test-key".to_string(),
                timeout: Duration::from_secs(2),
                max_retries,
                retry_delay: Duration::from_millis(10),
                rate_limit: 100,
            },
            clock,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn fetch_parses_intensity() {
        let up = upstream(vec![(StatusCode::OK, r#"{"carbonIntensity":212.5,"zone":"X"}"#)]).await;
        let client = client(up.addr, 3);

        let reading = client
            .fetch("US-CAL-CISO", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reading.intensity, 212.5);
        assert_eq!(reading.region, "US-CAL-CISO");
        assert_eq!(up.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fetch_retries_on_5xx_then_succeeds() {
        let up = upstream(vec![
            (StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            (StatusCode::OK, r#"{"carbonIntensity":99.0}"#),
        ])
        .await;
        let client = client(up.addr, 3);

        let reading = client
            .fetch("US-CAL-CISO", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reading.intensity, 99.0);
        assert_eq!(up.hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fetch_fails_immediately_on_4xx() {
        let up = upstream(vec![(StatusCode::FORBIDDEN, "nope")]).await;
        let client = client(up.addr, 3);

        let result = client.fetch("US-CAL-CISO", &CancellationToken::new()).await;
        assert!(matches!(
            result,
            Err(SignalError::AuthOrClient { status: 403, .. })
        ));
        assert_eq!(up.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fetch_exhausts_retries_on_persistent_5xx() {
        let up = upstream(vec![(StatusCode::BAD_GATEWAY, "down")]).await;
        let client = client(up.addr, 3);

        let result = client.fetch("US-CAL-CISO", &CancellationToken::new()).await;
        assert!(matches!(result, Err(SignalError::Transport(_))));
        assert_eq!(up.hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn unparseable_body_is_a_protocol_error() {
        let up = upstream(vec![(StatusCode::OK, "not json")]).await;
        let client = client(up.addr, 3);

        let result = client.fetch("US-CAL-CISO", &CancellationToken::new()).await;
        assert!(matches!(result, Err(SignalError::Protocol(_))));
    }

    #[tokio::test]
    async fn negative_intensity_is_a_protocol_error() {
        let up = upstream(vec![(StatusCode::OK, r#"{"carbonIntensity":-4.0}"#)]).await;
        let client = client(up.addr, 3);

        let result = client.fetch("US-CAL-CISO", &CancellationToken::new()).await;
        assert!(matches!(result, Err(SignalError::Protocol(_))));
    }

    #[tokio::test]
    async fn canceled_token_short_circuits() {
        let up = upstream(vec![(StatusCode::OK, r#"{"carbonIntensity":1.0}"#)]).await;
        let client = client(up.addr, 3);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = client.fetch("US-CAL-CISO", &cancel).await;
        assert!(matches!(result, Err(SignalError::Canceled)));
        assert_eq!(up.hits.load(Ordering::SeqCst), 0);
    }
}
