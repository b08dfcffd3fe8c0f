//! Lifecycle management.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     RpcServer::new → register callback → admin → reflection
//!     → HTTP side-channel → bind → stop triggers → GC → serve
//!
//! Shutdown (shutdown.rs):
//!     signal | ctx cancelled | listener exit → Shutdown::trigger (first wins)
//!     → graceful stop of both listeners → grace period → storage close
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: every method is registered before the listener serves
//! - One shutdown path regardless of what triggered it
//! - Shutdown has a drain timeout, then a fixed grace period

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{Main, StorageClose};
