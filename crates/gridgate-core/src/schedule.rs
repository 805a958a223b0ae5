//! Schedule evaluation — day-of-week ranges and HH:MM windows.
//!
//! Windows are textual in configuration (`dayOfWeek: "1-5"`,
//! `startTime: "16:00"`) and parsed into minute-of-day form here. A
//! window whose end is before its start wraps past midnight; a day range
//! whose start is after its end wraps past the week boundary (`"5-1"`
//! means Fri, Sat, Sun, Mon).

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minutes in a day; minute-of-day values are in `[0, 1440)`.
pub const MINUTES_PER_DAY: u16 = 1440;

/// Schedule parsing and validation failures.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid day of week spec {0:?} (items must be 0-6 or d1-d2)")]
    InvalidDays(String),

    #[error("invalid time {0:?} (must be HH:MM in 24h format)")]
    InvalidTime(String),

    #[error("invalid pricing schedule: {0}")]
    InvalidPricing(String),
}

/// A recurring weekly window with optional tariff rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleWindow {
    /// Days of the week this window applies to (0 = Sunday).
    pub days: BTreeSet<u8>,
    /// Start minute-of-day, inclusive.
    pub start_minute: u16,
    /// End minute-of-day, exclusive. `end < start` wraps past midnight.
    pub end_minute: u16,
    /// Rate in $/kWh while inside this window (pricing schedules only).
    pub peak_rate: Option<f64>,
    /// Rate in $/kWh outside this window (pricing schedules only).
    pub off_peak_rate: Option<f64>,
}

impl ScheduleWindow {
    /// Whether `t` falls inside this window.
    ///
    /// Day membership is tested on `t`'s own weekday, so a wrapping
    /// window like `22:00-02:00` on day 5 covers Friday 22:00-24:00 and
    /// any listed day's 00:00-02:00.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        let weekday = t.weekday().num_days_from_sunday() as u8;
        if !self.days.contains(&weekday) {
            return false;
        }

        let minute = (t.hour() * 60 + t.minute()) as u16;
        if self.start_minute <= self.end_minute {
            minute >= self.start_minute && minute < self.end_minute
        } else {
            minute >= self.start_minute || minute < self.end_minute
        }
    }
}

/// Parse a day-of-week spec like `"1-5"`, `"0,6"`, or `"5-1,3"`.
///
/// Ranges where the start is after the end wrap the week boundary.
pub fn parse_days(spec: &str) -> Result<BTreeSet<u8>, ScheduleError> {
    let invalid = || ScheduleError::InvalidDays(spec.to_string());

    let mut days = BTreeSet::new();
    for item in spec.split(',') {
        let item = item.trim();
        let mut parts = item.split('-');
        let first = parse_day(parts.next().unwrap_or(""), spec)?;
        match parts.next() {
            None => {
                days.insert(first);
            }
            Some(second) => {
                if parts.next().is_some() {
                    return Err(invalid());
                }
                let second = parse_day(second, spec)?;
                if first <= second {
                    days.extend(first..=second);
                } else {
                    // Wraps the week boundary: 5-1 means {5, 6, 0, 1}.
                    days.extend(first..=6);
                    days.extend(0..=second);
                }
            }
        }
    }
    Ok(days)
}

fn parse_day(s: &str, spec: &str) -> Result<u8, ScheduleError> {
    match s.parse::<u8>() {
        Ok(d) if s.len() == 1 && d <= 6 => Ok(d),
        _ => Err(ScheduleError::InvalidDays(spec.to_string())),
    }
}

/// Parse a strict `HH:MM` time into minute-of-day.
pub fn parse_time(s: &str) -> Result<u16, ScheduleError> {
    let invalid = || ScheduleError::InvalidTime(s.to_string());

    let bytes = s.as_bytes();
    if bytes.len() != 5 || bytes[2] != b':' {
        return Err(invalid());
    }
    let hour: u16 = s[..2].parse().map_err(|_| invalid())?;
    let minute: u16 = s[3..].parse().map_err(|_| invalid())?;
    if !s[..2].bytes().all(|b| b.is_ascii_digit())
        || !s[3..].bytes().all(|b| b.is_ascii_digit())
        || hour > 23
        || minute > 59
    {
        return Err(invalid());
    }
    Ok(hour * 60 + minute)
}

/// First window in `windows` containing `t`, if any.
///
/// Order matters: callers may place more specific windows first.
pub fn current_window(t: DateTime<Utc>, windows: &[ScheduleWindow]) -> Option<&ScheduleWindow> {
    windows.iter().find(|w| w.contains(t))
}

/// A validated time-of-use tariff table.
///
/// All windows carry the same off-peak rate, checked at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingSchedule {
    /// Peak windows in priority order.
    pub windows: Vec<ScheduleWindow>,
    /// The rate in effect outside every window.
    pub off_peak_rate: f64,
}

impl PricingSchedule {
    /// Validate a set of windows into a pricing schedule.
    ///
    /// Every window must carry `peak_rate > off_peak_rate > 0`, and the
    /// off-peak rate must be uniform across windows.
    pub fn new(windows: Vec<ScheduleWindow>) -> Result<Self, ScheduleError> {
        let first = windows
            .first()
            .ok_or_else(|| ScheduleError::InvalidPricing("no windows configured".to_string()))?;
        let off_peak_rate = first.off_peak_rate.ok_or_else(|| {
            ScheduleError::InvalidPricing("window is missing an off-peak rate".to_string())
        })?;

        for (i, window) in windows.iter().enumerate() {
            let peak = window.peak_rate.ok_or_else(|| {
                ScheduleError::InvalidPricing(format!("window {i} is missing a peak rate"))
            })?;
            let off_peak = window.off_peak_rate.ok_or_else(|| {
                ScheduleError::InvalidPricing(format!("window {i} is missing an off-peak rate"))
            })?;
            if off_peak <= 0.0 {
                return Err(ScheduleError::InvalidPricing(format!(
                    "window {i}: off-peak rate must be positive"
                )));
            }
            if peak <= off_peak {
                return Err(ScheduleError::InvalidPricing(format!(
                    "window {i}: peak rate {peak} must exceed off-peak rate {off_peak}"
                )));
            }
            if off_peak != off_peak_rate {
                return Err(ScheduleError::InvalidPricing(format!(
                    "window {i}: off-peak rate {off_peak} differs from schedule rate {off_peak_rate}"
                )));
            }
        }

        Ok(Self {
            windows,
            off_peak_rate,
        })
    }
}
