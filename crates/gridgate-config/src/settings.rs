//! Typed configuration, immutable after startup.

use std::time::Duration;

use gridgate_core::{PricingSchedule, ScheduleWindow};

use crate::error::{ConfigError, ConfigResult};

/// Carbon feed client settings.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    /// Upstream auth token.
    pub key: String,
    /// Base URL; the region is appended.
    pub base_url: String,
    /// Default grid region.
    pub region: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Requests per minute across all callers.
    pub rate_limit: usize,
}

/// Cache freshness windows.
#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub max_age: Duration,
}

/// Admission decision tuning.
#[derive(Debug, Clone, Copy)]
pub struct SchedulingSettings {
    /// Base carbon threshold in gCO₂eq/kWh.
    pub base_carbon_threshold: f64,
    /// Threshold substituted while inside a peak-carbon window.
    pub peak_carbon_threshold: f64,
    /// Maximum deferral before a workload is force-admitted.
    pub max_delay: Duration,
    /// Bound on concurrently admitted (not yet bound) workloads.
    pub max_concurrent: usize,
}

/// Peak-carbon window configuration.
#[derive(Debug, Clone, Default)]
pub struct PeakHoursSettings {
    pub enabled: bool,
    pub windows: Vec<ScheduleWindow>,
}

/// Price-aware gating configuration.
#[derive(Debug, Clone)]
pub struct PricingSettings {
    pub enabled: bool,
    /// "tou" or "external".
    pub provider: String,
    /// TOU tariff table (from `PRICING_SCHEDULES_PATH`).
    pub schedule: Option<PricingSchedule>,
    /// Rate threshold during peak periods, $/kWh.
    pub peak_threshold: f64,
    /// Rate threshold during off-peak periods, $/kWh.
    pub off_peak_threshold: f64,
    /// Tariff/location identifier for the external provider.
    pub location_id: String,
    /// External provider bearer token.
    pub api_key: String,
    /// External provider API root.
    pub provider_url: String,
}

impl PricingSettings {
    /// Label used for the electricity-rate gauge.
    pub fn location_label(&self) -> &str {
        if self.location_id.is_empty() {
            "tou"
        } else {
            &self.location_id
        }
    }
}

/// Complete gate configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api: ApiSettings,
    pub cache: CacheSettings,
    pub scheduling: SchedulingSettings,
    pub peak_hours: PeakHoursSettings,
    pub pricing: PricingSettings,
}

impl Settings {
    /// Cross-field validation, run once after loading.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.api.key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.scheduling.base_carbon_threshold <= 0.0 {
            return Err(ConfigError::Invalid(
                "base carbon intensity threshold must be positive".to_string(),
            ));
        }
        if self.scheduling.peak_carbon_threshold <= 0.0 {
            return Err(ConfigError::Invalid(
                "peak carbon intensity threshold must be positive".to_string(),
            ));
        }
        if self.scheduling.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "max concurrent admissions must be positive".to_string(),
            ));
        }
        if self.api.rate_limit == 0 {
            return Err(ConfigError::Invalid(
                "API rate limit must be positive".to_string(),
            ));
        }
        if self.cache.max_age < self.cache.ttl {
            return Err(ConfigError::Invalid(
                "max cache age must be at least the cache TTL".to_string(),
            ));
        }

        if self.pricing.enabled {
            if self.pricing.peak_threshold <= 0.0 || self.pricing.off_peak_threshold <= 0.0 {
                return Err(ConfigError::Invalid(
                    "pricing thresholds must be positive".to_string(),
                ));
            }
            match self.pricing.provider.as_str() {
                "tou" => {
                    if self.pricing.schedule.is_none() {
                        return Err(ConfigError::Invalid(
                            "TOU pricing requires PRICING_SCHEDULES_PATH".to_string(),
                        ));
                    }
                }
                "external" => {
                    if self.pricing.api_key.is_empty() || self.pricing.location_id.is_empty() {
                        return Err(ConfigError::Invalid(
                            "external pricing requires PRICING_API_KEY and PRICING_LOCATION_ID"
                                .to_string(),
                        ));
                    }
                }
                other => {
                    return Err(ConfigError::Invalid(format!(
                        "unsupported pricing provider {other:?}"
                    )));
                }
            }
        }

        Ok(())
    }
}
