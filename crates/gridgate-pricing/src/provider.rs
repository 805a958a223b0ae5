//! The pricing provider seam.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use gridgate_core::{Clock, PricingSchedule};

use crate::error::{PricingError, PricingResult};
use crate::external::{ExternalProvider, ExternalProviderConfig};
use crate::tou::TouProvider;

/// Tariff period classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Period {
    Peak,
    OffPeak,
}

impl Period {
    /// Metric-label form ("peak" / "off-peak").
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Peak => "peak",
            Period::OffPeak => "off-peak",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rate observation at an instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateQuote {
    /// Rate in $/kWh.
    pub rate: f64,
    pub period: Period,
}

/// Source of the current electricity rate.
#[async_trait]
pub trait PricingProvider: Send + Sync {
    /// The rate and period in effect at `at`.
    async fn current_rate(
        &self,
        at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> PricingResult<RateQuote>;

    /// Whether `at` falls in a peak period.
    async fn is_peak(&self, at: DateTime<Utc>, cancel: &CancellationToken) -> PricingResult<bool> {
        Ok(self.current_rate(at, cancel).await?.period == Period::Peak)
    }
}

/// Which provider implementation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Offline time-of-use schedule table.
    Tou,
    /// External tariff API.
    External,
}

impl ProviderKind {
    /// Parse the `PRICING_PROVIDER` value.
    pub fn parse(s: &str) -> PricingResult<Self> {
        match s {
            "tou" => Ok(ProviderKind::Tou),
            "external" => Ok(ProviderKind::External),
            other => Err(PricingError::UnsupportedProvider(other.to_string())),
        }
    }
}

/// Build the configured provider.
///
/// `schedule` is required for [`ProviderKind::Tou`]; `external` is
/// required for [`ProviderKind::External`].
pub fn from_kind(
    kind: ProviderKind,
    schedule: Option<PricingSchedule>,
    external: Option<ExternalProviderConfig>,
    clock: Arc<dyn Clock>,
) -> PricingResult<Arc<dyn PricingProvider>> {
    match kind {
        ProviderKind::Tou => {
            let schedule = schedule.ok_or_else(|| {
                PricingError::MissingConfig("TOU provider needs a pricing schedule".to_string())
            })?;
            Ok(Arc::new(TouProvider::new(schedule)))
        }
        ProviderKind::External => {
            let config = external.ok_or_else(|| {
                PricingError::MissingConfig(
                    "external provider needs a location id and API key".to_string(),
                )
            })?;
            Ok(Arc::new(ExternalProvider::new(config, clock)?))
        }
    }
}
