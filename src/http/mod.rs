//! HTTP side-channel.
//!
//! # Data Flow
//! ```text
//! GET /metrics → Prometheus text rendered from the registry's handle
//! GET /healthz → health::HealthReporter
//! ```
//!
//! # Design Decisions
//! - Runs beside the RPC listener on its own endpoint
//! - Failures here are logged and never stop the RPC server
//! - Shares the RPC server's TLS material

pub mod server;

pub use server::HttpServer;
