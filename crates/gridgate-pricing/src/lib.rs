//! gridgate-pricing — electricity tariff providers.
//!
//! Two interchangeable implementations of [`PricingProvider`]:
//!
//! - [`TouProvider`] — offline, deterministic; reads a validated
//!   time-of-use schedule table
//! - [`ExternalProvider`] — fetches tariff data over HTTP with its own
//!   one-hour cache and peak-window metadata
//!
//! Selection happens once at startup via [`provider::from_kind`]; the
//! engine only ever sees the trait.

pub mod error;
pub mod external;
pub mod provider;
pub mod tou;

pub use error::{PricingError, PricingResult};
pub use external::{ExternalProvider, ExternalProviderConfig};
pub use provider::{from_kind, Period, PricingProvider, ProviderKind, RateQuote};
pub use tou::TouProvider;
