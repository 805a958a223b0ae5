//! Environment and YAML schedule loading.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use gridgate_core::{parse_days, parse_duration, parse_time, PricingSchedule, ScheduleWindow};

use crate::error::{ConfigError, ConfigResult};
use crate::settings::{
    ApiSettings, CacheSettings, PeakHoursSettings, PricingSettings, SchedulingSettings, Settings,
};

const DEFAULT_API_URL: &str = "https://api.electricitymap.org/v3/carbon-intensity/latest?zone=";
const DEFAULT_REGION: &str = "US-CAL-CISO";
const DEFAULT_PRICING_URL: &str = "https://api.genability.com/v1";

impl Settings {
    /// Load and validate configuration from process environment.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (tests pass a map).
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let base_threshold = get_f64(lookup, "CARBON_INTENSITY_THRESHOLD", 150.0)?;
        let peak_threshold = get_f64(
            lookup,
            "PEAK_CARBON_INTENSITY_THRESHOLD",
            base_threshold * 0.75,
        )?;

        let mut peak_hours = PeakHoursSettings {
            enabled: get_bool(lookup, "PEAK_HOURS_ENABLED", false)?,
            windows: Vec::new(),
        };
        if let Some(path) = lookup("PEAK_SCHEDULES_PATH") {
            peak_hours.windows = load_schedule_windows(Path::new(&path))?;
            peak_hours.enabled = true;
        }

        let pricing_schedule = match lookup("PRICING_SCHEDULES_PATH") {
            Some(path) => {
                let windows = load_schedule_windows(Path::new(&path))?;
                Some(PricingSchedule::new(windows)?)
            }
            None => None,
        };

        let settings = Settings {
            api: ApiSettings {
                key: lookup("ELECTRICITY_MAP_API_KEY").unwrap_or_default(),
                base_url: get_string(lookup, "ELECTRICITY_MAP_API_URL", DEFAULT_API_URL),
                region: get_string(lookup, "ELECTRICITY_MAP_API_REGION", DEFAULT_REGION),
                timeout: get_duration(lookup, "API_TIMEOUT", Duration::from_secs(10))?,
                max_retries: get_u32(lookup, "API_MAX_RETRIES", 3)?,
                retry_delay: get_duration(lookup, "API_RETRY_DELAY", Duration::from_secs(1))?,
                rate_limit: get_usize(lookup, "API_RATE_LIMIT", 10)?,
            },
            cache: CacheSettings {
                ttl: get_duration(lookup, "CACHE_TTL", Duration::from_secs(5 * 60))?,
                max_age: get_duration(lookup, "MAX_CACHE_AGE", Duration::from_secs(60 * 60))?,
            },
            scheduling: SchedulingSettings {
                base_carbon_threshold: base_threshold,
                peak_carbon_threshold: peak_threshold,
                max_delay: get_duration(lookup, "MAX_SCHEDULING_DELAY", Duration::from_secs(86_400))?,
                max_concurrent: get_usize(lookup, "MAX_CONCURRENT_PODS", 2)?,
            },
            peak_hours,
            pricing: PricingSettings {
                enabled: get_bool(lookup, "PRICING_ENABLED", false)?,
                provider: get_string(lookup, "PRICING_PROVIDER", "tou"),
                schedule: pricing_schedule,
                peak_threshold: get_f64(lookup, "PRICING_PEAK_THRESHOLD", 0.15)?,
                off_peak_threshold: get_f64(lookup, "PRICING_OFFPEAK_THRESHOLD", 0.10)?,
                location_id: lookup("PRICING_LOCATION_ID").unwrap_or_default(),
                api_key: lookup("PRICING_API_KEY").unwrap_or_default(),
                provider_url: get_string(lookup, "PRICING_PROVIDER_URL", DEFAULT_PRICING_URL),
            },
        };

        settings.validate()?;

        info!(
            region = %settings.api.region,
            base_threshold = settings.scheduling.base_carbon_threshold,
            peak_windows = settings.peak_hours.windows.len(),
            pricing_enabled = settings.pricing.enabled,
            "configuration loaded"
        );

        Ok(settings)
    }
}

/// Wire shape of a schedule YAML file.
#[derive(Debug, Deserialize)]
struct ScheduleFile {
    schedules: Vec<ScheduleEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleEntry {
    day_of_week: String,
    start_time: String,
    end_time: String,
    #[serde(default)]
    peak_rate: Option<f64>,
    #[serde(default)]
    off_peak_rate: Option<f64>,
}

/// Read and parse a YAML schedule file into validated windows.
pub fn load_schedule_windows(path: &Path) -> ConfigResult<Vec<ScheduleWindow>> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ScheduleFileRead {
        path: path.display().to_string(),
        source,
    })?;
    let file: ScheduleFile =
        serde_yaml::from_str(&text).map_err(|e| ConfigError::ScheduleFileParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    let mut windows = Vec::with_capacity(file.schedules.len());
    for entry in &file.schedules {
        windows.push(ScheduleWindow {
            days: parse_days(&entry.day_of_week)?,
            start_minute: parse_time(&entry.start_time)?,
            end_minute: parse_time(&entry.end_time)?,
            peak_rate: entry.peak_rate,
            off_peak_rate: entry.off_peak_rate,
        });
    }
    Ok(windows)
}

fn get_string(lookup: &dyn Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    match lookup(key) {
        Some(v) if !v.is_empty() => v,
        _ => default.to_string(),
    }
}

fn get_f64(lookup: &dyn Fn(&str) -> Option<String>, key: &str, default: f64) -> ConfigResult<f64> {
    match lookup(key) {
        Some(v) if !v.is_empty() => v.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: v,
        }),
        _ => Ok(default),
    }
}

fn get_u32(lookup: &dyn Fn(&str) -> Option<String>, key: &str, default: u32) -> ConfigResult<u32> {
    match lookup(key) {
        Some(v) if !v.is_empty() => v.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: v,
        }),
        _ => Ok(default),
    }
}

fn get_usize(
    lookup: &dyn Fn(&str) -> Option<String>,
    key: &str,
    default: usize,
) -> ConfigResult<usize> {
    match lookup(key) {
        Some(v) if !v.is_empty() => v.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: v,
        }),
        _ => Ok(default),
    }
}

fn get_bool(
    lookup: &dyn Fn(&str) -> Option<String>,
    key: &str,
    default: bool,
) -> ConfigResult<bool> {
    match lookup(key) {
        Some(v) if !v.is_empty() => v.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: v,
        }),
        _ => Ok(default),
    }
}

fn get_duration(
    lookup: &dyn Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> ConfigResult<Duration> {
    match lookup(key) {
        Some(v) if !v.is_empty() => {
            parse_duration(&v).ok_or_else(|| ConfigError::InvalidValue {
                key: key.to_string(),
                value: v,
            })
        }
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_with_minimal_env() {
        let lookup = lookup_from(&[("ELECTRICITY_MAP_API_KEY", "secret")]);
        let settings = Settings::from_lookup(&lookup).unwrap();

        assert_eq!(settings.api.region, "US-CAL-CISO");
        assert_eq!(settings.api.timeout, Duration::from_secs(10));
        assert_eq!(settings.api.max_retries, 3);
        assert_eq!(settings.api.rate_limit, 10);
        assert_eq!(settings.cache.ttl, Duration::from_secs(300));
        assert_eq!(settings.cache.max_age, Duration::from_secs(3600));
        assert_eq!(settings.scheduling.base_carbon_threshold, 150.0);
        assert_eq!(settings.scheduling.peak_carbon_threshold, 112.5);
        assert_eq!(settings.scheduling.max_delay, Duration::from_secs(86_400));
        assert_eq!(settings.scheduling.max_concurrent, 2);
        assert!(!settings.pricing.enabled);
        assert_eq!(settings.pricing.provider, "tou");
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let lookup = lookup_from(&[]);
        assert!(matches!(
            Settings::from_lookup(&lookup),
            Err(ConfigError::MissingApiKey)
        ));
    }

    #[test]
    fn overrides_are_parsed() {
        let lookup = lookup_from(&[
            ("ELECTRICITY_MAP_API_KEY", "secret"),
            ("ELECTRICITY_MAP_API_REGION", "DE"),
            ("CARBON_INTENSITY_THRESHOLD", "220.5"),
            ("MAX_SCHEDULING_DELAY", "6h"),
            ("MAX_CONCURRENT_PODS", "8"),
            ("CACHE_TTL", "1m"),
        ]);
        let settings = Settings::from_lookup(&lookup).unwrap();

        assert_eq!(settings.api.region, "DE");
        assert_eq!(settings.scheduling.base_carbon_threshold, 220.5);
        // Peak defaults to 75% of the overridden base.
        assert_eq!(settings.scheduling.peak_carbon_threshold, 220.5 * 0.75);
        assert_eq!(settings.scheduling.max_delay, Duration::from_secs(6 * 3600));
        assert_eq!(settings.scheduling.max_concurrent, 8);
        assert_eq!(settings.cache.ttl, Duration::from_secs(60));
    }

    #[test]
    fn invalid_values_fail_loading() {
        let lookup = lookup_from(&[
            ("ELECTRICITY_MAP_API_KEY", "secret"),
            ("CARBON_INTENSITY_THRESHOLD", "very high"),
        ]);
        assert!(matches!(
            Settings::from_lookup(&lookup),
            Err(ConfigError::InvalidValue { .. })
        ));

        let lookup = lookup_from(&[
            ("ELECTRICITY_MAP_API_KEY", "secret"),
            ("MAX_SCHEDULING_DELAY", "soon"),
        ]);
        assert!(Settings::from_lookup(&lookup).is_err());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let lookup = lookup_from(&[
            ("ELECTRICITY_MAP_API_KEY", "secret"),
            ("MAX_CONCURRENT_PODS", "0"),
        ]);
        assert!(Settings::from_lookup(&lookup).is_err());
    }

    #[test]
    fn pricing_with_tou_requires_schedule() {
        let lookup = lookup_from(&[
            ("ELECTRICITY_MAP_API_KEY", "secret"),
            ("PRICING_ENABLED", "true"),
        ]);
        assert!(matches!(
            Settings::from_lookup(&lookup),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn pricing_external_requires_credentials() {
        let lookup = lookup_from(&[
            ("ELECTRICITY_MAP_API_KEY", "secret"),
            ("PRICING_ENABLED", "true"),
            ("PRICING_PROVIDER", "external"),
        ]);
        assert!(Settings::from_lookup(&lookup).is_err());

        let lookup = lookup_from(&[
            ("ELECTRICITY_MAP_API_KEY", "secret"),
            ("PRICING_ENABLED", "true"),
            ("PRICING_PROVIDER", "external"),
            ("PRICING_API_KEY", "k"),
            ("PRICING_LOCATION_ID", "pge-tou-b"),
        ]);
        assert!(Settings::from_lookup(&lookup).is_ok());
    }

    fn write_schedule(yaml: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn schedule_file_loads_windows() {
        let file = write_schedule(
            r#"
schedules:
  - dayOfWeek: "1-5"
    startTime: "16:00"
    endTime: "21:00"
    peakRate: 0.25
    offPeakRate: 0.10
"#,
        );

        let windows = load_schedule_windows(file.path()).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].start_minute, 960);
        assert_eq!(windows[0].end_minute, 1260);
        assert_eq!(windows[0].peak_rate, Some(0.25));
        assert_eq!(
            windows[0].days,
            std::collections::BTreeSet::from([1, 2, 3, 4, 5])
        );
    }

    #[test]
    fn schedule_file_without_rates_is_fine_for_peak_hours() {
        let file = write_schedule(
            r#"
schedules:
  - dayOfWeek: "0,6"
    startTime: "12:00"
    endTime: "18:00"
"#,
        );

        let windows = load_schedule_windows(file.path()).unwrap();
        assert_eq!(windows[0].peak_rate, None);
    }

    #[test]
    fn schedule_file_rejects_bad_day_spec() {
        let file = write_schedule(
            r#"
schedules:
  - dayOfWeek: "8"
    startTime: "12:00"
    endTime: "18:00"
"#,
        );
        assert!(load_schedule_windows(file.path()).is_err());
    }

    #[test]
    fn schedule_file_rejects_bad_time() {
        let file = write_schedule(
            r#"
schedules:
  - dayOfWeek: "1"
    startTime: "25:00"
    endTime: "18:00"
"#,
        );
        assert!(load_schedule_windows(file.path()).is_err());
    }

    #[test]
    fn missing_schedule_file_is_reported() {
        let result = load_schedule_windows(Path::new("/nonexistent/schedules.yaml"));
        assert!(matches!(
            result,
            Err(ConfigError::ScheduleFileRead { .. })
        ));
    }

    #[test]
    fn pricing_schedule_path_feeds_validated_schedule() {
        let file = write_schedule(
            r#"
schedules:
  - dayOfWeek: "1-5"
    startTime: "16:00"
    endTime: "21:00"
    peakRate: 0.25
    offPeakRate: 0.10
"#,
        );
        let path = file.path().display().to_string();

        let lookup = lookup_from(&[
            ("ELECTRICITY_MAP_API_KEY", "secret"),
            ("PRICING_ENABLED", "true"),
            ("PRICING_SCHEDULES_PATH", path.as_str()),
        ]);
        let settings = Settings::from_lookup(&lookup).unwrap();
        let schedule = settings.pricing.schedule.unwrap();
        assert_eq!(schedule.off_peak_rate, 0.10);
    }

    #[test]
    fn pricing_schedule_with_inverted_rates_fails() {
        let file = write_schedule(
            r#"
schedules:
  - dayOfWeek: "1-5"
    startTime: "16:00"
    endTime: "21:00"
    peakRate: 0.05
    offPeakRate: 0.10
"#,
        );
        let path = file.path().display().to_string();

        let lookup = lookup_from(&[
            ("ELECTRICITY_MAP_API_KEY", "secret"),
            ("PRICING_SCHEDULES_PATH", path.as_str()),
        ]);
        assert!(Settings::from_lookup(&lookup).is_err());
    }
}
