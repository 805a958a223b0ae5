//! Time-of-use provider — offline schedule-table pricing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use gridgate_core::{current_window, PricingSchedule};

use crate::error::PricingResult;
use crate::provider::{Period, PricingProvider, RateQuote};

/// Deterministic provider backed by a validated [`PricingSchedule`].
///
/// The first window containing the instant supplies the peak rate; with
/// no match the schedule's common off-peak rate applies. No I/O.
pub struct TouProvider {
    schedule: PricingSchedule,
}

impl TouProvider {
    pub fn new(schedule: PricingSchedule) -> Self {
        Self { schedule }
    }
}

#[async_trait]
impl PricingProvider for TouProvider {
    async fn current_rate(
        &self,
        at: DateTime<Utc>,
        _cancel: &CancellationToken,
    ) -> PricingResult<RateQuote> {
        match current_window(at, &self.schedule.windows) {
            Some(window) => Ok(RateQuote {
                rate: window.peak_rate.unwrap_or(self.schedule.off_peak_rate),
                period: Period::Peak,
            }),
            None => Ok(RateQuote {
                rate: self.schedule.off_peak_rate,
                period: Period::OffPeak,
            }),
        }
    }
}
