//! The admission engine — ordered decision pipeline over shared state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use gridgate_config::Settings;
use gridgate_core::{
    annotations, current_window, parse_duration, Clock, Decision, ThresholdKind, WorkloadInputs,
};
use gridgate_metrics::{attempt, duration, GateMetrics};
use gridgate_pricing::{Period, PricingProvider};
use gridgate_signal::{CacheConfig, CarbonSource, Lookup, SignalCache, SignalError};

use crate::error::{GateError, GateResult};
use crate::probe;

/// Shared admission gate state. One per process; `evaluate` is reentrant.
pub struct GateEngine {
    pub(crate) settings: Settings,
    pub(crate) cache: SignalCache,
    pub(crate) source: Arc<dyn CarbonSource>,
    pricing: Option<Arc<dyn PricingProvider>>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) metrics: Arc<GateMetrics>,
    /// Workloads admitted but not yet bound; bounded by the concurrency cap.
    in_flight: AtomicUsize,
    shutdown_tx: watch::Sender<bool>,
    pub(crate) shutdown_rx: watch::Receiver<bool>,
    /// Root token for upstream calls; canceled on close.
    pub(crate) cancel: CancellationToken,
    probe_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl GateEngine {
    /// Assemble the engine from its collaborators.
    ///
    /// `pricing` must be `Some` when pricing is enabled in `settings`;
    /// evaluations fail with [`GateError::MissingPricingConfig`] otherwise.
    pub fn new(
        settings: Settings,
        source: Arc<dyn CarbonSource>,
        pricing: Option<Arc<dyn PricingProvider>>,
        clock: Arc<dyn Clock>,
        metrics: Arc<GateMetrics>,
    ) -> Self {
        let cache = SignalCache::new(
            CacheConfig {
                ttl: settings.cache.ttl,
                max_age: settings.cache.max_age,
            },
            Arc::clone(&clock),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            settings,
            cache,
            source,
            pricing,
            clock,
            metrics,
            in_flight: AtomicUsize::new(0),
            shutdown_tx,
            shutdown_rx,
            cancel: CancellationToken::new(),
            probe_handle: std::sync::Mutex::new(None),
        }
    }

    /// Decide whether the workload may be placed now.
    ///
    /// The host calls this from its pre-filter phase, possibly from many
    /// threads at once, and retries deferred workloads later.
    pub async fn evaluate(
        &self,
        inputs: &WorkloadInputs,
        cancel: &CancellationToken,
    ) -> GateResult<Decision> {
        let started = self.clock.now();
        let result = self.evaluate_inner(inputs, cancel).await;

        // Cancellation unwinds without touching counters.
        if !matches!(result, Err(GateError::Canceled)) {
            self.metrics
                .scheduling_duration
                .with_label_values(&[duration::TOTAL])
                .observe(self.clock.since(started).as_secs_f64());
        }
        result
    }

    async fn evaluate_inner(
        &self,
        inputs: &WorkloadInputs,
        cancel: &CancellationToken,
    ) -> GateResult<Decision> {
        if cancel.is_cancelled() || self.cancel.is_cancelled() {
            return Err(GateError::Canceled);
        }

        // 1. Bounded wait: a workload deferred past its budget always runs.
        let max_delay = match inputs.annotation(annotations::MAX_DELAY) {
            Some(value) => parse_duration(value).ok_or_else(|| {
                self.metrics
                    .scheduling_attempts
                    .with_label_values(&[attempt::ERROR])
                    .inc();
                GateError::InvalidAnnotation {
                    key: annotations::MAX_DELAY.to_string(),
                    value: value.to_string(),
                }
            })?,
            None => self.settings.scheduling.max_delay,
        };
        if self.clock.since(inputs.created_at) > max_delay {
            self.metrics
                .scheduling_attempts
                .with_label_values(&[attempt::MAX_DELAY_EXCEEDED])
                .inc();
            info!(workload = %inputs.name, "admitting: maximum scheduling delay exceeded");
            return Ok(Decision::Admit {
                reason: "maximum scheduling delay exceeded".to_string(),
            });
        }

        // 2. Opt-out.
        if inputs.annotation_is_true(annotations::CARBON_SKIP)
            || inputs.annotation_is_true(annotations::PRICE_SKIP)
        {
            self.metrics
                .scheduling_attempts
                .with_label_values(&[attempt::SKIPPED])
                .inc();
            return Ok(Decision::Admit {
                reason: "opted out".to_string(),
            });
        }

        // 3. Concurrency gate, fast path. The slot itself is taken only
        //    after the signal checks pass.
        let cap = self.settings.scheduling.max_concurrent;
        let current = self.in_flight.load(Ordering::Acquire);
        if current >= cap {
            return Ok(concurrency_defer(current, cap));
        }

        // 4. Pricing.
        if self.settings.pricing.enabled {
            if let Some(decision) = self.check_pricing(inputs, cancel).await? {
                return Ok(decision);
            }
        }

        // 5. Carbon intensity.
        if let Some(decision) = self.check_carbon(inputs, cancel).await? {
            return Ok(decision);
        }

        // 6. Take a slot and admit.
        let taken = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                if n < cap {
                    Some(n + 1)
                } else {
                    None
                }
            });
        match taken {
            Ok(_) => {}
            Err(current) => return Ok(concurrency_defer(current, cap)),
        }

        self.record_admission_savings(inputs).await;
        self.metrics
            .region_selections
            .with_label_values(&[self.settings.api.region.as_str()])
            .inc();
        self.metrics
            .scheduling_attempts
            .with_label_values(&[attempt::SUCCESS])
            .inc();
        Ok(Decision::Admit {
            reason: "within thresholds".to_string(),
        })
    }

    /// Pricing check; `Ok(Some(_))` is a terminal deferral.
    async fn check_pricing(
        &self,
        inputs: &WorkloadInputs,
        cancel: &CancellationToken,
    ) -> GateResult<Option<Decision>> {
        let provider = self.pricing.as_ref().ok_or(GateError::MissingPricingConfig)?;
        let quote = provider.current_rate(self.clock.now(), cancel).await?;

        let threshold = match inputs.annotation(annotations::PRICE_THRESHOLD) {
            Some(value) => value.parse::<f64>().map_err(|_| {
                self.metrics
                    .scheduling_attempts
                    .with_label_values(&[attempt::INVALID_THRESHOLD])
                    .inc();
                GateError::InvalidAnnotation {
                    key: annotations::PRICE_THRESHOLD.to_string(),
                    value: value.to_string(),
                }
            })?,
            None => match quote.period {
                Period::Peak => self.settings.pricing.peak_threshold,
                Period::OffPeak => self.settings.pricing.off_peak_threshold,
            },
        };

        self.metrics
            .electricity_rate
            .with_label_values(&[self.settings.pricing.location_label(), quote.period.as_str()])
            .set(quote.rate);

        if quote.rate > threshold {
            self.metrics
                .price_delays
                .with_label_values(&[quote.period.as_str()])
                .inc();
            self.metrics
                .cost_savings_dollars
                .inc_by(quote.rate - threshold);
            self.metrics
                .scheduling_attempts
                .with_label_values(&[attempt::PRICE_EXCEEDED])
                .inc();

            let threshold_kind = match quote.period {
                Period::Peak => ThresholdKind::PricePeak,
                Period::OffPeak => ThresholdKind::PriceOffPeak,
            };
            debug!(
                workload = %inputs.name,
                rate = quote.rate,
                threshold,
                period = %quote.period,
                "deferring: electricity rate above threshold"
            );
            return Ok(Some(Decision::Defer {
                reason: format!(
                    "current electricity rate (${:.3}/kWh) exceeds {} threshold (${:.3}/kWh)",
                    quote.rate, quote.period, threshold
                ),
                threshold_kind,
                observed: quote.rate,
                threshold,
            }));
        }

        Ok(None)
    }

    /// Carbon check; `Ok(Some(_))` is a terminal deferral.
    async fn check_carbon(
        &self,
        inputs: &WorkloadInputs,
        cancel: &CancellationToken,
    ) -> GateResult<Option<Decision>> {
        let region = self.settings.api.region.as_str();
        let lookup_started = self.clock.now();

        let (reading, lookup) = match self
            .cache
            .get_or_fetch(region, self.source.as_ref(), cancel)
            .await
        {
            Ok(found) => found,
            Err(SignalError::Canceled) => return Err(GateError::Canceled),
            Err(e) => {
                self.metrics
                    .scheduling_attempts
                    .with_label_values(&[attempt::ERROR])
                    .inc();
                self.metrics
                    .scheduling_duration
                    .with_label_values(&[duration::API_MISS])
                    .observe(self.clock.since(lookup_started).as_secs_f64());
                return Err(e.into());
            }
        };

        let lookup_label = match lookup {
            Lookup::Hit => duration::API_HIT,
            Lookup::Fetched | Lookup::Stale => duration::API_MISS,
        };
        self.metrics
            .scheduling_duration
            .with_label_values(&[lookup_label])
            .observe(self.clock.since(lookup_started).as_secs_f64());
        if lookup == Lookup::Stale {
            warn!(region, "deciding on a stale carbon reading");
        }

        self.metrics
            .carbon_intensity
            .with_label_values(&[region])
            .set(reading.intensity);

        let mut threshold = match inputs.annotation(annotations::CARBON_THRESHOLD) {
            Some(value) => value.parse::<f64>().map_err(|_| {
                self.metrics
                    .scheduling_attempts
                    .with_label_values(&[attempt::INVALID_THRESHOLD])
                    .inc();
                GateError::InvalidAnnotation {
                    key: annotations::CARBON_THRESHOLD.to_string(),
                    value: value.to_string(),
                }
            })?,
            None => self.settings.scheduling.base_carbon_threshold,
        };

        // A peak-carbon window substitutes the peak threshold outright.
        let mut threshold_kind = ThresholdKind::CarbonBase;
        if self.settings.peak_hours.enabled
            && current_window(self.clock.now(), &self.settings.peak_hours.windows).is_some()
        {
            threshold = self.settings.scheduling.peak_carbon_threshold;
            threshold_kind = ThresholdKind::CarbonPeak;
        }

        if reading.intensity > threshold {
            self.metrics
                .scheduling_attempts
                .with_label_values(&[attempt::INTENSITY_EXCEEDED])
                .inc();
            self.metrics
                .carbon_savings_grams
                .inc_by(reading.intensity - threshold);

            let kind_label = match threshold_kind {
                ThresholdKind::CarbonPeak => "peak",
                _ => "base",
            };
            debug!(
                workload = %inputs.name,
                intensity = reading.intensity,
                threshold,
                kind = kind_label,
                "deferring: carbon intensity above threshold"
            );
            return Ok(Some(Decision::Defer {
                reason: format!(
                    "current carbon intensity ({:.2}) exceeds {} threshold ({:.2})",
                    reading.intensity, kind_label, threshold
                ),
                threshold_kind,
                observed: reading.intensity,
                threshold,
            }));
        }

        Ok(None)
    }

    /// Best-effort savings estimate against the intensity recorded when
    /// the workload was first evaluated. Unparseable values are ignored.
    async fn record_admission_savings(&self, inputs: &WorkloadInputs) {
        let Some(value) = inputs.annotation(annotations::INITIAL_INTENSITY) else {
            return;
        };
        let Ok(initial) = value.parse::<f64>() else {
            return;
        };
        if let Some(reading) = self.cache.get(&self.settings.api.region).await {
            if initial > reading.intensity {
                self.metrics
                    .carbon_savings_grams
                    .inc_by(initial - reading.intensity);
            }
        }
    }

    /// Release the concurrency slot after the host reports bind
    /// completion (successful or not). Never underflows.
    pub fn release_binding(&self) {
        let released = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if let Ok(previous) = released {
            debug!(in_flight = previous - 1, "released admission slot");
        }
    }

    /// Number of admitted-but-unbound workloads.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Verify the carbon feed end to end (used by the health probe and
    /// the daemon's health endpoint). Goes through the cache, so it never
    /// hammers the upstream while a fresh reading exists.
    pub async fn health_check(&self) -> GateResult<()> {
        self.cache
            .get_or_fetch(
                &self.settings.api.region,
                self.source.as_ref(),
                &self.cancel,
            )
            .await?;
        Ok(())
    }

    /// Start the periodic health probe. Idempotent: a second call
    /// replaces nothing and is ignored.
    pub fn spawn_probe(self: &Arc<Self>) {
        let mut slot = self
            .probe_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return;
        }
        let engine = Arc::clone(self);
        let shutdown = self.shutdown_rx.clone();
        *slot = Some(tokio::spawn(probe::run(engine, shutdown)));
        info!(interval_secs = probe::PROBE_INTERVAL.as_secs(), "health probe started");
    }

    /// Shut down: stop the probe, cancel in-flight upstream calls.
    /// Idempotent.
    pub async fn close(&self) {
        let _ = self.shutdown_tx.send(true);
        self.cancel.cancel();

        let handle = self
            .probe_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!("admission engine closed");
    }
}

fn concurrency_defer(current: usize, cap: usize) -> Decision {
    Decision::Defer {
        reason: format!(
            "max concurrent admissions ({cap}) reached, currently admitting {current}"
        ),
        threshold_kind: ThresholdKind::MaxDelay,
        observed: current as f64,
        threshold: cap as f64,
    }
}
