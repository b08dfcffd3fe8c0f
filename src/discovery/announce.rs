//! Endpoint announcement with lease-loss detection.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::discovery::{Coordinator, KeepAliveAck, LeaseId, LEASE_TTL_SECS};
use crate::error::Error;
use crate::observability::metrics;

/// Upper bound for each coordination call made during cleanup.
pub const CLEANUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Undoes an announcement. Consumed by [`Cleanup::run`], so it runs at most once.
#[must_use = "call Cleanup::run at shutdown to deregister the endpoint"]
pub struct Cleanup {
    registration: Option<Registration>,
}

struct Registration {
    client: Arc<dyn Coordinator>,
    key: String,
    lease: LeaseId,
    monitor: CancellationToken,
}

impl Cleanup {
    /// Cleanup for an announcement that never happened.
    pub fn noop() -> Self {
        Self { registration: None }
    }

    pub fn is_noop(&self) -> bool {
        self.registration.is_none()
    }

    /// Delete the endpoint and revoke the lease.
    ///
    /// Does not depend on the announcing context, which is usually cancelled
    /// by now. Both steps are attempted even if the first fails.
    pub async fn run(self) {
        let Some(registration) = self.registration else {
            return;
        };
        // Revoking ends the keepalive stream; that must not read as a lost lease.
        registration.monitor.cancel();

        let Registration {
            client, key, lease, ..
        } = registration;

        match tokio::time::timeout(CLEANUP_TIMEOUT, client.delete_endpoint(&key)).await {
            Ok(Ok(())) => tracing::info!(key = %key, "Endpoint deregistered"),
            Ok(Err(e)) => tracing::warn!(key = %key, error = %e, "Failed to deregister endpoint"),
            Err(_) => tracing::warn!(key = %key, timeout = ?CLEANUP_TIMEOUT, "Endpoint deregistration timed out"),
        }

        match tokio::time::timeout(CLEANUP_TIMEOUT, client.revoke(lease)).await {
            Ok(Ok(())) => tracing::info!(lease, "Lease revoked"),
            Ok(Err(e)) => tracing::warn!(lease, error = %e, "Failed to revoke lease"),
            Err(_) => tracing::warn!(lease, timeout = ?CLEANUP_TIMEOUT, "Lease revocation timed out"),
        }
    }
}

/// Announce `endpoint` under `service` and watch the lease.
///
/// With no `client` this does nothing. If the lease is lost while `ctx` is
/// still live, `cancel` is called exactly once. Failing to grant or renew the
/// lease, or to register the endpoint, is an error.
pub async fn announce_self<F>(
    ctx: &CancellationToken,
    client: Option<Arc<dyn Coordinator>>,
    service: &str,
    endpoint: &str,
    cancel: F,
) -> Result<Cleanup, Error>
where
    F: FnOnce() + Send + 'static,
{
    let Some(client) = client else {
        tracing::debug!("No coordination store configured, skipping announcement");
        return Ok(Cleanup::noop());
    };

    let lease = client
        .grant(LEASE_TTL_SECS)
        .await
        .map_err(Error::LeaseGrant)?;
    tracing::info!(lease, ttl_secs = LEASE_TTL_SECS, "Lease granted");

    let acks = match client.keep_alive(lease).await {
        Ok(acks) => acks,
        Err(e) => {
            revoke_quietly(client.as_ref(), lease).await;
            return Err(Error::KeepAlive(e));
        }
    };

    let monitor = ctx.child_token();
    tokio::spawn(
        watch_lease(monitor.clone(), acks, service.to_string(), cancel)
            .instrument(tracing::Span::current()),
    );

    let key = format!("{service}/{endpoint}");
    if let Err(e) = client.add_endpoint(&key, endpoint, lease).await {
        monitor.cancel();
        revoke_quietly(client.as_ref(), lease).await;
        return Err(Error::RegisterEndpoint(e));
    }
    tracing::info!(key = %key, lease, "Endpoint announced");

    Ok(Cleanup {
        registration: Some(Registration {
            client,
            key,
            lease,
            monitor,
        }),
    })
}

async fn watch_lease<F>(
    ctx: CancellationToken,
    mut acks: mpsc::Receiver<KeepAliveAck>,
    service: String,
    cancel: F,
) where
    F: FnOnce(),
{
    let lost = loop {
        tokio::select! {
            biased;
            _ = ctx.cancelled() => break false,
            ack = acks.recv() => match ack {
                Some(ack) => tracing::trace!(lease = ack.lease, ttl = ack.ttl, "Lease renewed"),
                None => break true,
            },
        }
    };

    if lost {
        tracing::error!(service = %service, "Lease keepalive stopped, lease lost; shutting down");
        metrics::record_lease_lost(&service);
        cancel();
    } else {
        tracing::debug!(service = %service, "Lease monitor stopped");
    }
}

async fn revoke_quietly(client: &dyn Coordinator, lease: LeaseId) {
    match tokio::time::timeout(CLEANUP_TIMEOUT, client.revoke(lease)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(lease, error = %e, "Failed to revoke lease"),
        Err(_) => tracing::warn!(lease, "Lease revocation timed out"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn no_client_is_noop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let cleanup = announce_self(&CancellationToken::new(), None, "svc", "host:1", move || {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

        assert!(cleanup.is_noop());
        cleanup.run().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn monitor_ignores_acks_then_fires_on_close() {
        let (tx, rx) = mpsc::channel(4);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let task = tokio::spawn(watch_lease(
            CancellationToken::new(),
            rx,
            "svc".to_string(),
            move || {
                seen.fetch_add(1, Ordering::SeqCst);
            },
        ));

        tx.send(KeepAliveAck { lease: 1, ttl: 30 }).await.unwrap();
        tx.send(KeepAliveAck { lease: 1, ttl: 30 }).await.unwrap();
        drop(tx);
        task.await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn monitor_prefers_cancellation_over_close() {
        let (tx, rx) = mpsc::channel::<KeepAliveAck>(4);
        let ctx = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();

        // Both conditions are ready when the monitor first polls.
        ctx.cancel();
        drop(tx);
        watch_lease(ctx, rx, "svc".to_string(), move || {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
