//! Health reporting.
//!
//! # Data Flow
//! ```text
//! GET /healthz
//!     → readiness check (optional, bounded by the healthy deadline)
//!     → 200 "ok" | 503 <error text> | 503 "deadline exceeded"
//! ```
//!
//! # Design Decisions
//! - A check that overruns its deadline is dropped, not awaited
//! - No check configured means the process is healthy as long as it answers

pub mod healthz;

pub use healthz::{HealthReporter, ReadinessCheck};
