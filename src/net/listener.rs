//! RPC listener binding.

use std::net::SocketAddr;

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// Bind a TCP listener.
///
/// Binding happens eagerly so address conflicts surface before serving
/// starts. The returned listener is in non-blocking mode, ready to be handed
/// to the server.
pub async fn bind(address: &str) -> Result<std::net::TcpListener, ListenerError> {
    let bind_err = |source| ListenerError::Bind {
        address: address.to_string(),
        source,
    };

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(bind_err)?;
    let local_addr: SocketAddr = listener.local_addr().map_err(bind_err)?;

    tracing::info!(address = %local_addr, "Listener bound");

    listener.into_std().map_err(bind_err)
}
