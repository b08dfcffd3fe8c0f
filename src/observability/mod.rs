//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters and histograms via `metrics`)
//!
//! Consumers:
//!     → stdout (fmt or JSON subscriber, installed by the binary only)
//!     → GET /metrics on the HTTP side-channel (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Library code never installs a subscriber; the binary does
//! - Long-lived tasks are instrumented with the orchestrator's span
//! - One Prometheus recorder per process, rendered by every side-channel

pub mod logging;
pub mod metrics;
