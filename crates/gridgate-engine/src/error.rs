//! Engine error types.

use thiserror::Error;

use gridgate_pricing::PricingError;
use gridgate_signal::SignalError;

/// Failures surfaced to the host from `evaluate`.
///
/// The host treats these as "unschedulable for now" and retries; none of
/// them is a deferral decision.
#[derive(Debug, Error)]
pub enum GateError {
    /// A recognized annotation carried an unparseable value.
    #[error("invalid {key} annotation: {value:?}")]
    InvalidAnnotation { key: String, value: String },

    /// No fresh or stale-usable carbon reading could be obtained.
    #[error("carbon intensity data unavailable: {0}")]
    CarbonUnavailable(String),

    /// The pricing provider failed.
    #[error("electricity pricing unavailable: {0}")]
    PricingUnavailable(String),

    /// Pricing is enabled but no provider or thresholds are configured.
    #[error("pricing enabled but not configured")]
    MissingPricingConfig,

    /// The caller's cancellation signal fired.
    #[error("evaluation canceled")]
    Canceled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<SignalError> for GateError {
    fn from(err: SignalError) -> Self {
        match err {
            SignalError::Canceled => GateError::Canceled,
            other => GateError::CarbonUnavailable(other.to_string()),
        }
    }
}

impl From<PricingError> for GateError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::Canceled => GateError::Canceled,
            PricingError::MissingConfig(_) => GateError::MissingPricingConfig,
            other => GateError::PricingUnavailable(other.to_string()),
        }
    }
}

pub type GateResult<T> = Result<T, GateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_errors_map_to_carbon_unavailable() {
        let err: GateError = SignalError::RateLimited.into();
        assert!(matches!(err, GateError::CarbonUnavailable(_)));

        let err: GateError = SignalError::Canceled.into();
        assert!(matches!(err, GateError::Canceled));
    }

    #[test]
    fn pricing_errors_map_by_kind() {
        let err: GateError = PricingError::ProviderUnavailable("down".to_string()).into();
        assert!(matches!(err, GateError::PricingUnavailable(_)));

        let err: GateError = PricingError::MissingConfig("no schedule".to_string()).into();
        assert!(matches!(err, GateError::MissingPricingConfig));
    }
}
