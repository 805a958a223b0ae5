//! Domain types shared across the admission gate.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A carbon-intensity observation for a grid region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarbonReading {
    /// Grid region identifier (e.g. "US-CAL-CISO").
    pub region: String,
    /// Carbon intensity in gCO₂eq/kWh; never negative.
    pub intensity: f64,
    /// When the upstream feed observed this value.
    pub observed_at: DateTime<Utc>,
}

/// Well-known workload annotations read by the gate.
///
/// Names are carried verbatim from the host orchestrator's annotation
/// namespaces so existing workloads keep working.
pub mod annotations {
    /// Opt this workload out of carbon-aware gating ("true").
    pub const CARBON_SKIP: &str = "carbon-aware-scheduler.kubernetes.io/skip";
    /// Opt this workload out of price-aware gating ("true").
    pub const PRICE_SKIP: &str = "price-aware-scheduler.kubernetes.io/skip";
    /// Per-workload carbon threshold override (gCO₂eq/kWh).
    pub const CARBON_THRESHOLD: &str =
        "carbon-aware-scheduler.kubernetes.io/carbon-intensity-threshold";
    /// Per-workload price threshold override ($/kWh).
    pub const PRICE_THRESHOLD: &str = "price-aware-scheduler.kubernetes.io/price-threshold";
    /// Per-workload maximum scheduling delay override (e.g. "6h").
    pub const MAX_DELAY: &str = "carbon-aware-scheduler.kubernetes.io/max-scheduling-delay";
    /// Intensity at first evaluation, recorded by the host for savings
    /// estimation.
    pub const INITIAL_INTENSITY: &str = "carbon-aware-scheduler.kubernetes.io/initial-intensity";
}

/// Per-call inputs describing the workload under evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadInputs {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    /// When the workload object was created; drives the max-delay check.
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl WorkloadInputs {
    /// Look up an annotation value.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    /// Whether an annotation is set to the literal "true".
    pub fn annotation_is_true(&self, key: &str) -> bool {
        self.annotation(key) == Some("true")
    }
}

/// Which threshold produced a deferral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThresholdKind {
    CarbonBase,
    CarbonPeak,
    PricePeak,
    PriceOffPeak,
    MaxDelay,
}

/// The admission decision for a single workload at a single instant.
///
/// Failures (signal unavailable, invalid annotations, cancellation) are
/// the `Err` arm of the evaluation, not a `Decision` variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// Proceed with placement.
    Admit { reason: String },
    /// Refuse placement at this instant; the host retries later.
    Defer {
        reason: String,
        threshold_kind: ThresholdKind,
        /// The value that was measured (intensity, rate, or in-flight count).
        observed: f64,
        /// The limit it was compared against.
        threshold: f64,
    },
}

impl Decision {
    /// Whether this decision admits the workload.
    pub fn is_admit(&self) -> bool {
        matches!(self, Decision::Admit { .. })
    }
}
