//! RPC server subsystem.
//!
//! # Data Flow
//! ```text
//! POST /<service>/<method> (JSON body)
//!     → interceptor/ (stats → error normalization → quota)
//!     → handler registered via RpcServer::add_method
//!     → JSON response, or Status { code, message } on failure
//! ```
//!
//! # Design Decisions
//! - The server is assembled first and served later; registration must
//!   complete before the listener starts serving
//! - Every response carries its status code in `x-rpc-status`
//! - Extra server options are opaque router transforms applied outermost

pub mod interceptor;
pub mod reflection;
pub mod server;
pub mod status;

pub use interceptor::InterceptorChain;
pub use server::{RegisterServer, RpcServer, ServerOption};
pub use status::{Code, RpcError, Status, STATUS_HEADER};

/// How a method is treated by quota enforcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// Charged against read quota.
    Read,
    /// Charged against write quota; tokens are returned if the call fails.
    Write,
    /// Never charged.
    Admin,
}
