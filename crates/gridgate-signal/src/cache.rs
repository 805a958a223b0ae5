//! Read-coalesced carbon reading cache.
//!
//! One entry per region. An entry is *fresh* while its age is under the
//! TTL and *stale-usable* while under the max age; beyond the max age it
//! behaves as absent. Concurrent misses for the same region collapse into
//! a single upstream fetch via a per-region guard.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use gridgate_core::{CarbonReading, Clock};

use crate::client::CarbonSource;
use crate::error::SignalResult;

/// Freshness windows for cached readings.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Age below which an entry is served without consulting upstream.
    pub ttl: Duration,
    /// Age below which an entry may still back a failed refresh.
    pub max_age: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            max_age: Duration::from_secs(60 * 60),
        }
    }
}

/// How a reading was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Served from a fresh cache entry.
    Hit,
    /// Fetched from the upstream API.
    Fetched,
    /// Refresh failed; served from a stale-usable entry.
    Stale,
}

struct CacheEntry {
    reading: CarbonReading,
    cached_at: DateTime<Utc>,
}

/// TTL-bounded, single-flight cache of the latest reading per region.
pub struct SignalCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    /// Per-region fetch guards; holding a guard means "I am the fetcher".
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
}

impl SignalCache {
    pub fn new(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            config,
            clock,
        }
    }

    /// The current reading for `region`, if fresh.
    pub async fn get(&self, region: &str) -> Option<CarbonReading> {
        let entries = self.entries.read().await;
        let entry = entries.get(region)?;
        if self.clock.since(entry.cached_at) < self.config.ttl {
            Some(entry.reading.clone())
        } else {
            None
        }
    }

    /// Replace the entry for `region`, stamping it with the current time.
    pub async fn set(&self, region: &str, reading: CarbonReading) {
        let mut entries = self.entries.write().await;
        entries.insert(
            region.to_string(),
            CacheEntry {
                reading,
                cached_at: self.clock.now(),
            },
        );
    }

    /// The stale-usable reading for `region`, if any (TTL exceeded but
    /// within max age).
    async fn stale(&self, region: &str) -> Option<CarbonReading> {
        let entries = self.entries.read().await;
        let entry = entries.get(region)?;
        if self.clock.since(entry.cached_at) < self.config.max_age {
            Some(entry.reading.clone())
        } else {
            None
        }
    }

    /// Fresh reading for `region`, refreshing through `source` on miss.
    ///
    /// Concurrent misses coalesce: only one caller fetches, the rest wait
    /// on the region guard and then observe the refreshed entry. When the
    /// fetch fails, a stale-usable entry is returned flagged
    /// [`Lookup::Stale`]; with no usable entry the error propagates.
    /// Failed refreshes never evict.
    pub async fn get_or_fetch(
        &self,
        region: &str,
        source: &dyn CarbonSource,
        cancel: &CancellationToken,
    ) -> SignalResult<(CarbonReading, Lookup)> {
        if let Some(reading) = self.get(region).await {
            return Ok((reading, Lookup::Hit));
        }

        let guard = {
            let mut inflight = self.inflight.lock().await;
            Arc::clone(
                inflight
                    .entry(region.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        let _fetching = guard.lock().await;

        // A coalesced waiter sees the fetcher's result here.
        if let Some(reading) = self.get(region).await {
            return Ok((reading, Lookup::Hit));
        }

        match source.fetch(region, cancel).await {
            Ok(reading) => {
                self.set(region, reading.clone()).await;
                debug!(region, intensity = reading.intensity, "cache refreshed");
                Ok((reading, Lookup::Fetched))
            }
            Err(e) => {
                if let Some(reading) = self.stale(region).await {
                    warn!(region, error = %e, "refresh failed, serving stale reading");
                    Ok((reading, Lookup::Stale))
                } else {
                    Err(e)
                }
            }
        }
    }
}
