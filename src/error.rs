//! Crate-level error type.

use crate::discovery::CoordinationError;
use crate::net::listener::ListenerError;
use crate::net::tls::TlsError;

/// Boxed error used at capability boundaries (registration callbacks,
/// readiness checks, storage close hooks).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by [`Main::run`](crate::lifecycle::Main::run) and the
/// announcement helpers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport security material is missing, mismatched or unreadable.
    #[error("invalid transport security configuration: {0}")]
    Tls(#[from] TlsError),

    #[error("RPC method {0} registered twice")]
    DuplicateMethod(String),

    /// The caller's registration callback failed.
    #[error("failed to register RPC services: {0}")]
    Registration(#[source] BoxError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("RPC server terminated: {0}")]
    Serve(#[source] std::io::Error),

    #[error("failed to connect to coordination store: {0}")]
    CoordinatorConnect(#[source] CoordinationError),

    #[error("failed to grant discovery lease: {0}")]
    LeaseGrant(#[source] CoordinationError),

    #[error("failed to start discovery lease keepalive: {0}")]
    KeepAlive(#[source] CoordinationError),

    #[error("failed to register discovery endpoint: {0}")]
    RegisterEndpoint(#[source] CoordinationError),
}
