//! gridgate-signal — the external carbon-intensity signal.
//!
//! Pairs an HTTP client for the carbon feed with a read-coalesced,
//! TTL-bounded cache so the admission engine never hammers the upstream
//! API and keeps deciding through short outages.
//!
//! # Architecture
//!
//! ```text
//! SignalCache
//!   ├── get()           fresh reading or miss
//!   ├── get_or_fetch()  single-flight refresh, stale-usable fallback
//!   └── set()           atomic replace, one entry per region
//!
//! CarbonClient (impl CarbonSource)
//!   ├── RateLimiter     sliding-window requests/minute
//!   ├── retries         transport / 5xx only, fixed delay
//!   └── parse           JSON body with numeric carbonIntensity
//! ```
//!
//! # Failure policy
//!
//! A failed refresh never evicts. Callers of [`SignalCache::get_or_fetch`]
//! receive the stale entry (flagged [`Lookup::Stale`]) while it is within
//! the max-age bound; only when no usable entry exists does the fetch
//! error propagate.

pub mod cache;
pub mod client;
pub mod error;
pub mod limiter;

pub use cache::{CacheConfig, Lookup, SignalCache};
pub use client::{CarbonClient, CarbonSource, ClientConfig};
pub use error::{SignalError, SignalResult};
pub use limiter::RateLimiter;
