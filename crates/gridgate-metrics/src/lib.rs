//! gridgate-metrics — the gate's observable surface.
//!
//! Typed Prometheus collectors on an explicit [`prometheus::Registry`]
//! passed through constructors; nothing registers into global state.
//! The daemon exposes [`GateMetrics::encode_text`] on `/metrics`.
//!
//! | Metric | Type | Labels |
//! |---|---|---|
//! | `gridgate_carbon_intensity` | gauge | `region` |
//! | `gridgate_electricity_rate` | gauge | `location`, `period` |
//! | `gridgate_scheduling_attempt_total` | counter | `result` |
//! | `gridgate_price_delay_total` | counter | `period` |
//! | `gridgate_carbon_savings_grams` | counter | — |
//! | `gridgate_cost_savings_dollars` | counter | — |
//! | `gridgate_scheduling_duration_seconds` | histogram | `result` |
//! | `gridgate_region_selection_total` | counter | `region` |
//! | `gridgate_health_probe_failures_total` | counter | — |

use prometheus::{
    Counter, Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts,
    Registry, TextEncoder,
};
use thiserror::Error;

/// `result` label values for the attempt counter.
pub mod attempt {
    pub const SUCCESS: &str = "success";
    pub const SKIPPED: &str = "skipped";
    pub const MAX_DELAY_EXCEEDED: &str = "max_delay_exceeded";
    pub const INTENSITY_EXCEEDED: &str = "intensity_exceeded";
    pub const PRICE_EXCEEDED: &str = "price_exceeded";
    pub const ERROR: &str = "error";
    pub const INVALID_THRESHOLD: &str = "invalid_threshold";
}

/// `result` label values for the duration histogram.
pub mod duration {
    pub const TOTAL: &str = "total";
    pub const API_HIT: &str = "api_hit";
    pub const API_MISS: &str = "api_miss";
}

/// Metrics setup failures.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    Registration(#[from] prometheus::Error),

    #[error("failed to encode metrics: {0}")]
    Encoding(String),
}

pub type MetricsResult<T> = Result<T, MetricsError>;

/// All collectors for the admission gate.
pub struct GateMetrics {
    registry: Registry,

    /// Last observed carbon intensity per region (gCO₂eq/kWh).
    pub carbon_intensity: GaugeVec,
    /// Last computed electricity rate per location and period ($/kWh).
    pub electricity_rate: GaugeVec,
    /// Admission attempts by outcome.
    pub scheduling_attempts: IntCounterVec,
    /// Deferrals caused by price thresholds, by period.
    pub price_delays: IntCounterVec,
    /// Estimated carbon emissions avoided (grams CO₂).
    pub carbon_savings_grams: Counter,
    /// Estimated cost avoided (dollars).
    pub cost_savings_dollars: Counter,
    /// Evaluation latency, total and split by carbon-lookup path.
    pub scheduling_duration: HistogramVec,
    /// Successful admissions per region.
    pub region_selections: IntCounterVec,
    /// Background health probe failures.
    pub probe_failures: IntCounter,
}

impl GateMetrics {
    /// Create collectors on a fresh registry.
    pub fn new() -> MetricsResult<Self> {
        Self::with_registry(Registry::new())
    }

    /// Create collectors and register them with `registry`.
    pub fn with_registry(registry: Registry) -> MetricsResult<Self> {
        let carbon_intensity = GaugeVec::new(
            Opts::new(
                "gridgate_carbon_intensity",
                "Current carbon intensity (gCO2eq/kWh) for a given region",
            ),
            &["region"],
        )?;
        registry.register(Box::new(carbon_intensity.clone()))?;

        let electricity_rate = GaugeVec::new(
            Opts::new(
                "gridgate_electricity_rate",
                "Current electricity rate ($/kWh) for a given location",
            ),
            &["location", "period"],
        )?;
        registry.register(Box::new(electricity_rate.clone()))?;

        let scheduling_attempts = IntCounterVec::new(
            Opts::new(
                "gridgate_scheduling_attempt_total",
                "Number of workload admission attempts by result",
            ),
            &["result"],
        )?;
        registry.register(Box::new(scheduling_attempts.clone()))?;

        let price_delays = IntCounterVec::new(
            Opts::new(
                "gridgate_price_delay_total",
                "Number of deferrals due to electricity price thresholds",
            ),
            &["period"],
        )?;
        registry.register(Box::new(price_delays.clone()))?;

        let carbon_savings_grams = Counter::new(
            "gridgate_carbon_savings_grams",
            "Estimated carbon emissions avoided (grams CO2) through deferral",
        )?;
        registry.register(Box::new(carbon_savings_grams.clone()))?;

        let cost_savings_dollars = Counter::new(
            "gridgate_cost_savings_dollars",
            "Estimated cost avoided (dollars) through price-aware deferral",
        )?;
        registry.register(Box::new(cost_savings_dollars.clone()))?;

        let scheduling_duration = HistogramVec::new(
            HistogramOpts::new(
                "gridgate_scheduling_duration_seconds",
                "Latency of admission evaluations",
            )
            .buckets(prometheus::exponential_buckets(0.001, 2.0, 15)?),
            &["result"],
        )?;
        registry.register(Box::new(scheduling_duration.clone()))?;

        let region_selections = IntCounterVec::new(
            Opts::new(
                "gridgate_region_selection_total",
                "Number of admissions per region",
            ),
            &["region"],
        )?;
        registry.register(Box::new(region_selections.clone()))?;

        let probe_failures = IntCounter::new(
            "gridgate_health_probe_failures_total",
            "Number of failed background health probes against the carbon feed",
        )?;
        registry.register(Box::new(probe_failures.clone()))?;

        Ok(Self {
            registry,
            carbon_intensity,
            electricity_rate,
            scheduling_attempts,
            price_delays,
            carbon_savings_grams,
            cost_savings_dollars,
            scheduling_duration,
            region_selections,
            probe_failures,
        })
    }

    /// The backing registry, for scrape handlers or extra collectors.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render the registry in Prometheus text exposition format.
    pub fn encode_text(&self) -> MetricsResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(MetricsError::Registration)?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_collectors_register() {
        let metrics = GateMetrics::new().unwrap();
        assert!(metrics.registry().gather().len() >= 4);
    }

    #[test]
    fn duplicate_registration_fails() {
        let registry = Registry::new();
        GateMetrics::with_registry(registry.clone()).unwrap();
        assert!(GateMetrics::with_registry(registry).is_err());
    }

    #[test]
    fn counters_accumulate_and_encode() {
        let metrics = GateMetrics::new().unwrap();

        metrics
            .scheduling_attempts
            .with_label_values(&[attempt::SUCCESS])
            .inc();
        metrics
            .scheduling_attempts
            .with_label_values(&[attempt::INTENSITY_EXCEEDED])
            .inc();
        metrics
            .carbon_intensity
            .with_label_values(&["US-CAL-CISO"])
            .set(142.0);
        metrics.carbon_savings_grams.inc_by(50.0);

        let text = metrics.encode_text().unwrap();
        assert!(text.contains("gridgate_scheduling_attempt_total{result=\"success\"} 1"));
        assert!(text.contains("gridgate_carbon_intensity{region=\"US-CAL-CISO\"} 142"));
        assert!(text.contains("gridgate_carbon_savings_grams 50"));
    }

    #[test]
    fn savings_counters_never_decrease() {
        let metrics = GateMetrics::new().unwrap();
        metrics.carbon_savings_grams.inc_by(10.0);
        let before = metrics.carbon_savings_grams.get();
        metrics.carbon_savings_grams.inc_by(5.0);
        assert!(metrics.carbon_savings_grams.get() >= before);
    }

    #[test]
    fn histogram_observes_by_label() {
        let metrics = GateMetrics::new().unwrap();
        metrics
            .scheduling_duration
            .with_label_values(&[duration::TOTAL])
            .observe(0.004);
        metrics
            .scheduling_duration
            .with_label_values(&[duration::API_MISS])
            .observe(0.2);

        let text = metrics.encode_text().unwrap();
        assert!(text.contains("gridgate_scheduling_duration_seconds_count{result=\"total\"} 1"));
    }
}
