//! Shutdown coordination.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum_server::Handle;

/// Graceful-stop fan-in for the RPC and HTTP listeners.
///
/// Cloned into every stop trigger (signals, context cancellation, listener
/// exit). Only the first [`trigger`](Shutdown::trigger) has any effect.
#[derive(Clone)]
pub struct Shutdown {
    rpc: Handle,
    http: Handle,
    triggered: Arc<AtomicBool>,
    drain_timeout: Duration,
}

impl Shutdown {
    pub fn new(drain_timeout: Duration) -> Self {
        Self {
            rpc: Handle::new(),
            http: Handle::new(),
            triggered: Arc::new(AtomicBool::new(false)),
            drain_timeout,
        }
    }

    /// Stop both listeners, letting in-flight calls drain for up to the
    /// drain timeout. Returns whether this call performed the shutdown.
    pub fn trigger(&self, reason: &str) -> bool {
        if self
            .triggered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(reason, "Shutdown already in progress");
            return false;
        }

        tracing::info!(reason, drain_timeout = ?self.drain_timeout, "Graceful shutdown triggered");
        self.rpc.graceful_shutdown(Some(self.drain_timeout));
        self.http.graceful_shutdown(Some(self.drain_timeout));
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Address the RPC listener is serving on. Waits until serving starts;
    /// `None` if it stopped before that.
    pub async fn rpc_listening(&self) -> Option<SocketAddr> {
        self.rpc.listening().await
    }

    /// Like [`rpc_listening`](Self::rpc_listening), for the HTTP side-channel.
    /// Never resolves if no side-channel is configured.
    pub async fn http_listening(&self) -> Option<SocketAddr> {
        self.http.listening().await
    }

    pub(crate) fn rpc_handle(&self) -> Handle {
        self.rpc.clone()
    }

    pub(crate) fn http_handle(&self) -> Handle {
        self.http.clone()
    }
}
