//! gridgate-engine — the admission decision pipeline.
//!
//! The engine answers one question per workload: is "now" an acceptable
//! moment to place it? Checks run in a fixed order, and the first
//! terminal outcome wins:
//!
//! ```text
//! evaluate(workload)
//!   1. max-delay      age past the deferral budget   → Admit
//!   2. opt-out        skip annotation set            → Admit
//!   3. concurrency    in-flight slots exhausted      → Defer
//!   4. pricing        rate above period threshold    → Defer
//!   5. carbon         intensity above threshold      → Defer
//!   6.                                               → Admit
//! ```
//!
//! The in-flight slot is taken only after checks 4-5 pass and is
//! released by the host's bind notification. A background probe keeps
//! the carbon feed warm and surfaces faults without evicting the cache.

pub mod engine;
pub mod error;
pub mod probe;

pub use engine::GateEngine;
pub use error::{GateError, GateResult};
