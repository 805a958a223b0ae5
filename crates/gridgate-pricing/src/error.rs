//! Pricing error types.

use thiserror::Error;

/// Errors from tariff providers.
#[derive(Debug, Error)]
pub enum PricingError {
    /// The external tariff API could not be reached or answered 5xx.
    #[error("pricing provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The tariff API answered with a body we could not use.
    #[error("pricing response invalid: {0}")]
    Protocol(String),

    /// Required pricing configuration is absent.
    #[error("pricing configuration missing: {0}")]
    MissingConfig(String),

    /// `PRICING_PROVIDER` named something we do not implement.
    #[error("unsupported pricing provider {0:?}")]
    UnsupportedProvider(String),

    /// The caller's cancellation signal fired.
    #[error("request canceled")]
    Canceled,
}

pub type PricingResult<T> = Result<T, PricingError>;
