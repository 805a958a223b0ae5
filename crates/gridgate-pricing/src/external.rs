//! External tariff provider — HTTP-backed pricing with its own cache.
//!
//! Fetches `GET {base_url}/tariffs/{location_id}/prices` with a bearer
//! token. The response carries the current rate and a list of peak
//! windows; both are cached for an hour so the admission path rarely
//! touches the network.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use gridgate_core::{parse_time, Clock};

use crate::error::{PricingError, PricingResult};
use crate::provider::{Period, PricingProvider, RateQuote};

/// Configuration for the external tariff API.
#[derive(Debug, Clone)]
pub struct ExternalProviderConfig {
    /// API root, e.g. "https://api.genability.com/v1".
    pub base_url: String,
    /// Bearer token.
    pub api_key: String,
    /// Utility/tariff identifier appended to the URL.
    pub location_id: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// How long fetched tariff data stays valid.
    pub cache_ttl: Duration,
}

impl ExternalProviderConfig {
    /// Default cache TTL for tariff data.
    pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);
}

/// Wire shape of the tariff response.
#[derive(Debug, Deserialize)]
struct TariffBody {
    #[serde(rename = "currentRate")]
    current_rate: f64,
    #[serde(rename = "peakHours", default)]
    peak_hours: Vec<TariffPeriodBody>,
}

#[derive(Debug, Deserialize)]
struct TariffPeriodBody {
    #[serde(rename = "startTime")]
    start_time: String,
    #[serde(rename = "endTime")]
    end_time: String,
    rate: f64,
}

/// Parsed tariff data.
#[derive(Debug, Clone)]
struct Tariff {
    current_rate: f64,
    peak_windows: Vec<PeakWindow>,
}

#[derive(Debug, Clone, Copy)]
struct PeakWindow {
    start_minute: u16,
    end_minute: u16,
    rate: f64,
}

impl PeakWindow {
    fn contains(&self, minute: u16) -> bool {
        if self.start_minute <= self.end_minute {
            minute >= self.start_minute && minute < self.end_minute
        } else {
            minute >= self.start_minute || minute < self.end_minute
        }
    }
}

struct TariffCache {
    tariff: Tariff,
    fetched_at: DateTime<Utc>,
}

/// HTTP-backed [`PricingProvider`].
pub struct ExternalProvider {
    http: reqwest::Client,
    config: ExternalProviderConfig,
    clock: Arc<dyn Clock>,
    cache: RwLock<Option<TariffCache>>,
}

impl ExternalProvider {
    pub fn new(config: ExternalProviderConfig, clock: Arc<dyn Clock>) -> PricingResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PricingError::ProviderUnavailable(e.to_string()))?;
        Ok(Self {
            http,
            config,
            clock,
            cache: RwLock::new(None),
        })
    }

    async fn cached_tariff(&self) -> Option<Tariff> {
        let cache = self.cache.read().await;
        let entry = cache.as_ref()?;
        if self.clock.since(entry.fetched_at) < self.config.cache_ttl {
            Some(entry.tariff.clone())
        } else {
            None
        }
    }

    async fn fetch_tariff(&self, cancel: &CancellationToken) -> PricingResult<Tariff> {
        let url = format!(
            "{}/tariffs/{}/prices",
            self.config.base_url.trim_end_matches('/'),
            self.config.location_id
        );

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(PricingError::Canceled),
            r = self
                .http
                .get(&url)
                .bearer_auth(&self.config.api_key)
                .send() => r.map_err(|e| PricingError::ProviderUnavailable(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(PricingError::ProviderUnavailable(format!(
                "tariff API returned status {status}"
            )));
        }

        let body: TariffBody = response
            .json()
            .await
            .map_err(|e| PricingError::Protocol(e.to_string()))?;

        let mut peak_windows = Vec::with_capacity(body.peak_hours.len());
        for period in &body.peak_hours {
            let start_minute = parse_time(&period.start_time)
                .map_err(|e| PricingError::Protocol(e.to_string()))?;
            let end_minute =
                parse_time(&period.end_time).map_err(|e| PricingError::Protocol(e.to_string()))?;
            peak_windows.push(PeakWindow {
                start_minute,
                end_minute,
                rate: period.rate,
            });
        }

        debug!(
            location = %self.config.location_id,
            rate = body.current_rate,
            peak_windows = peak_windows.len(),
            "fetched tariff data"
        );

        Ok(Tariff {
            current_rate: body.current_rate,
            peak_windows,
        })
    }

    async fn tariff(&self, cancel: &CancellationToken) -> PricingResult<Tariff> {
        if let Some(tariff) = self.cached_tariff().await {
            return Ok(tariff);
        }

        let tariff = self.fetch_tariff(cancel).await?;
        let mut cache = self.cache.write().await;
        *cache = Some(TariffCache {
            tariff: tariff.clone(),
            fetched_at: self.clock.now(),
        });
        Ok(tariff)
    }
}

#[async_trait]
impl PricingProvider for ExternalProvider {
    async fn current_rate(
        &self,
        at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> PricingResult<RateQuote> {
        let tariff = self.tariff(cancel).await?;
        let minute = (at.hour() * 60 + at.minute()) as u16;

        for window in &tariff.peak_windows {
            if window.contains(minute) {
                return Ok(RateQuote {
                    rate: window.rate,
                    period: Period::Peak,
                });
            }
        }
        Ok(RateQuote {
            rate: tariff.current_rate,
            period: Period::OffPeak,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicU32, Ordering};

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use chrono::TimeZone;
    use gridgate_core::MockClock;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    async fn tariff_upstream(status: StatusCode, body: &'static str) -> (SocketAddr, Arc<AtomicU32>) {
        let hits = Arc::new(AtomicU32::new(0));
        let state = (Arc::clone(&hits), status, body);

        async fn handler(
            State((hits, status, body)): State<(Arc<AtomicU32>, StatusCode, &'static str)>,
        ) -> (StatusCode, String) {
            hits.fetch_add(1, Ordering::SeqCst);
            (status, body.to_string())
        }

        let app = Router::new()
            .route("/tariffs/:id/prices", get(handler))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, hits)
    }

    fn provider(addr: SocketAddr, clock: Arc<MockClock>) -> ExternalProvider {
        ExternalProvider::new(
            ExternalProviderConfig {
                base_url: format!("http://{addr}"),
                api_key: "tariff-key".to_string(),
                location_id: "pge-tou-b".to_string(),
                timeout: Duration::from_secs(2),
                cache_ttl: Duration::from_secs(3600),
            },
            clock,
        )
        .unwrap()
    }

    const TARIFF_JSON: &str = r#"{
        "currentRate": 0.11,
        "peakHours": [
            {"name": "On-Peak", "startTime": "16:00", "endTime": "21:00", "rate": 0.28}
        ]
    }"#;

    #[tokio::test]
    async fn quotes_peak_rate_inside_peak_window() {
        let (addr, _) = tariff_upstream(StatusCode::OK, TARIFF_JSON).await;
        let clock = Arc::new(MockClock::new(base_time()));
        let provider = provider(addr, clock);

        // 17:00 — inside the 16:00-21:00 peak window.
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 17, 0, 0).unwrap();
        let quote = provider
            .current_rate(at, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(quote.rate, 0.28);
        assert_eq!(quote.period, Period::Peak);
    }

    #[tokio::test]
    async fn quotes_current_rate_off_peak() {
        let (addr, _) = tariff_upstream(StatusCode::OK, TARIFF_JSON).await;
        let clock = Arc::new(MockClock::new(base_time()));
        let provider = provider(addr, clock);

        let quote = provider
            .current_rate(base_time(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(quote.rate, 0.11);
        assert_eq!(quote.period, Period::OffPeak);
    }

    #[tokio::test]
    async fn tariff_data_is_cached() {
        let (addr, hits) = tariff_upstream(StatusCode::OK, TARIFF_JSON).await;
        let clock = Arc::new(MockClock::new(base_time()));
        let provider = provider(addr, clock.clone());

        for _ in 0..5 {
            provider
                .current_rate(clock.now(), &CancellationToken::new())
                .await
                .unwrap();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Past the TTL the next call refetches.
        clock.advance(Duration::from_secs(3601));
        provider
            .current_rate(clock.now(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn transport_failure_is_provider_unavailable() {
        let clock = Arc::new(MockClock::new(base_time()));
        // Nothing listens on this address.
        let provider = ExternalProvider::new(
            ExternalProviderConfig {
                base_url: "http://127.0.0.1:1".to_string(),
                api_key: "k".to_string(),
                location_id: "loc".to_string(),
                timeout: Duration::from_millis(200),
                cache_ttl: Duration::from_secs(3600),
            },
            clock,
        )
        .unwrap();

        let result = provider
            .current_rate(base_time(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(PricingError::ProviderUnavailable(_))));
    }

    #[tokio::test]
    async fn bad_body_is_a_protocol_error() {
        let (addr, _) = tariff_upstream(StatusCode::OK, "{}").await;
        let clock = Arc::new(MockClock::new(base_time()));
        let provider = provider(addr, clock);

        let result = provider
            .current_rate(base_time(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(PricingError::Protocol(_))));
    }
}
