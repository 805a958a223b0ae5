//! gridgate-config — environment and schedule-file configuration.
//!
//! All tuning comes from environment variables (with documented
//! defaults) plus optional YAML schedule files for peak-carbon windows
//! and the time-of-use tariff table. Invalid configuration aborts
//! startup; nothing here is reloadable at runtime.
//!
//! # Environment surface
//!
//! ```text
//! ELECTRICITY_MAP_API_KEY        (required) upstream auth token
//! ELECTRICITY_MAP_API_URL        base URL, region appended
//! ELECTRICITY_MAP_API_REGION     default US-CAL-CISO
//! API_TIMEOUT / API_MAX_RETRIES / API_RETRY_DELAY / API_RATE_LIMIT
//! CACHE_TTL / MAX_CACHE_AGE
//! CARBON_INTENSITY_THRESHOLD     default 150.0
//! PEAK_CARBON_INTENSITY_THRESHOLD  default 0.75 × base
//! MAX_SCHEDULING_DELAY           default 24h
//! MAX_CONCURRENT_PODS            default 2
//! PEAK_HOURS_ENABLED / PEAK_SCHEDULES_PATH
//! PRICING_ENABLED / PRICING_PROVIDER / PRICING_SCHEDULES_PATH
//! PRICING_PEAK_THRESHOLD / PRICING_OFFPEAK_THRESHOLD
//! PRICING_LOCATION_ID / PRICING_API_KEY / PRICING_PROVIDER_URL
//! ```

pub mod error;
pub mod loader;
pub mod settings;

pub use error::{ConfigError, ConfigResult};
pub use loader::load_schedule_windows;
pub use settings::{
    ApiSettings, CacheSettings, PeakHoursSettings, PricingSettings, SchedulingSettings, Settings,
};
