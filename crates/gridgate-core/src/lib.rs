//! gridgate-core — shared domain types for the GridGate admission gate.
//!
//! Provides the building blocks every other crate depends on:
//!
//! - [`Clock`] — injectable source of "now", with real and mock
//!   implementations so schedule, cache-freshness, and max-delay logic
//!   can be tested without wall-clock races
//! - [`ScheduleWindow`] / [`PricingSchedule`] — day-of-week + HH:MM
//!   windows with wrap-around semantics (past midnight, past the week
//!   boundary)
//! - [`WorkloadInputs`] / [`Decision`] — the admission engine's input
//!   and outcome types
//!
//! # Architecture
//!
//! ```text
//! gridgate-core
//!   ├── clock     Clock trait, SystemClock, MockClock, parse_duration
//!   ├── schedule  parse_days / parse_time / window membership
//!   └── types     CarbonReading, WorkloadInputs, Decision
//! ```

pub mod clock;
pub mod schedule;
pub mod types;

pub use clock::{parse_duration, Clock, MockClock, SystemClock};
pub use schedule::{
    current_window, parse_days, parse_time, PricingSchedule, ScheduleError, ScheduleWindow,
};
pub use types::{annotations, CarbonReading, Decision, ThresholdKind, WorkloadInputs};
