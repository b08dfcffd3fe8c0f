//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ServerConfig.rpc_endpoint
//!     → listener.rs (eager bind, bind errors surface to the caller)
//!     → tls.rs (optional certificate/key pair, both or neither)
//!     → rpc::RpcServer::serve
//! ```
//!
//! # Design Decisions
//! - Listeners are bound before serving so misconfiguration fails fast
//! - TLS material is read once at construction; no reload

pub mod listener;
pub mod tls;
