//! Signal error types.

use std::time::Duration;

use thiserror::Error;

/// Errors from the carbon feed client and cache.
#[derive(Debug, Error)]
pub enum SignalError {
    /// 4xx from the upstream API; retrying will not help.
    #[error("carbon API rejected the request (status {status}): {message}")]
    AuthOrClient { status: u16, message: String },

    /// 2xx with a body we could not parse.
    #[error("carbon API returned an unusable body: {0}")]
    Protocol(String),

    /// The shared requests-per-minute budget was exhausted before the
    /// caller's deadline.
    #[error("carbon API rate limit exhausted")]
    RateLimited,

    /// The per-request timeout elapsed.
    #[error("carbon API request timed out after {0:?}")]
    Timeout(Duration),

    /// The caller's cancellation signal fired.
    #[error("request canceled")]
    Canceled,

    /// Connection-level failure or 5xx response.
    #[error("carbon API transport error: {0}")]
    Transport(String),
}

impl SignalError {
    /// Whether another attempt against the upstream could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SignalError::Transport(_) | SignalError::Timeout(_))
    }
}

pub type SignalResult<T> = Result<T, SignalError>;
