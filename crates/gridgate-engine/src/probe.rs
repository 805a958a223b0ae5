//! Periodic health probe against the carbon feed.
//!
//! Wakes on a fixed interval and drives the engine's cache refresh path.
//! Failures are logged and counted but never evict the cache, so the
//! stale-usable fallback keeps working through feed outages.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error};

use crate::engine::GateEngine;

/// How often the probe runs.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// The probe loop; runs until the shutdown signal fires.
pub(crate) async fn run(engine: Arc<GateEngine>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(PROBE_INTERVAL) => {
                if let Err(e) = engine.health_check().await {
                    engine.metrics.probe_failures.inc();
                    error!(error = %e, "carbon feed health probe failed");
                }
            }
            _ = shutdown.changed() => {
                debug!("health probe shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use gridgate_core::MockClock;
    use gridgate_metrics::GateMetrics;

    use crate::engine::tests::{base_time, test_settings, StaticSource};

    #[tokio::test]
    async fn probe_failure_increments_counter_without_evicting() {
        let clock = Arc::new(MockClock::new(base_time()));
        let source = Arc::new(StaticSource::new(120.0, clock.clone()));
        let metrics = Arc::new(GateMetrics::new().unwrap());
        let engine = Arc::new(GateEngine::new(
            test_settings(),
            source.clone(),
            None,
            clock.clone(),
            metrics.clone(),
        ));

        // Warm the cache, then break the feed and age past the TTL.
        engine.health_check().await.unwrap();
        clock.advance(Duration::from_secs(600));
        source.set_fail(true);

        // A direct probe round: stale fallback succeeds, so the probe
        // itself does not fail while a stale-usable entry exists.
        engine.health_check().await.unwrap();

        // Age past max age: with no usable entry left the check fails.
        clock.advance(Duration::from_secs(3600));
        assert!(engine.health_check().await.is_err());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn probe_loop_stops_on_shutdown() {
        let clock = Arc::new(MockClock::new(base_time()));
        let source = Arc::new(StaticSource::new(120.0, clock.clone()));
        let metrics = Arc::new(GateMetrics::new().unwrap());
        let engine = Arc::new(GateEngine::new(
            test_settings(),
            source,
            None,
            clock,
            metrics,
        ));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run(engine, rx));

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("probe loop must stop promptly")
            .unwrap();
    }
}
