//! Shared fakes and helpers for integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use logserver::discovery::{CoordinationError, Coordinator, KeepAliveAck, LeaseId};
use logserver::quota::{QuotaError, QuotaManager, Spec};
use logserver::rpc::{MethodKind, RpcError};
use logserver::{BoxError, Error, Main, Registry, RpcServer, ServerConfig, Shutdown};

pub const LEASE_ID: LeaseId = 7587;

/// Config binding ephemeral loopback ports, with no grace period and no GC.
pub fn test_config(stats_prefix: &str) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.rpc_endpoint = "127.0.0.1:0".to_string();
    config.http_endpoint = Some("127.0.0.1:0".to_string());
    config.stats_prefix = stats_prefix.to_string();
    config.shutdown.grace_period_secs = 0;
    config.shutdown.drain_timeout_secs = 1;
    config.tree_gc.enabled = false;
    config
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Echo {
    pub text: String,
}

/// Registers `test.Echo/Say` (read), `test.Echo/Append` (write) and
/// `test.Echo/Fail` (read, always internal error).
pub fn register_echo(server: &mut RpcServer, _registry: &Registry) -> Result<(), BoxError> {
    server.add_method("test.Echo", "Say", MethodKind::Read, |req: Echo| async move {
        Ok::<_, RpcError>(req)
    })?;
    server.add_method("test.Echo", "Append", MethodKind::Write, |req: Echo| async move {
        Ok::<_, RpcError>(req)
    })?;
    server.add_method("test.Echo", "Fail", MethodKind::Read, |_: Echo| async move {
        Err::<Echo, _>(RpcError::Internal("handler exploded".into()))
    })?;
    Ok(())
}

pub fn failing_registration(_server: &mut RpcServer, _registry: &Registry) -> Result<(), BoxError> {
    Err("storage schema mismatch".into())
}

/// A running server under test.
pub struct Running {
    pub ctx: CancellationToken,
    pub shutdown: Shutdown,
    pub task: JoinHandle<Result<(), Error>>,
}

impl Running {
    pub fn start(main: Main) -> Self {
        let ctx = CancellationToken::new();
        let shutdown = main.shutdown();
        let task = tokio::spawn(main.run(ctx.clone()));
        Self {
            ctx,
            shutdown,
            task,
        }
    }

    pub async fn rpc_url(&self) -> String {
        let addr = self
            .shutdown
            .rpc_listening()
            .await
            .expect("RPC listener did not start");
        format!("http://{addr}")
    }

    pub async fn http_url(&self) -> String {
        let addr = self
            .shutdown
            .http_listening()
            .await
            .expect("HTTP side-channel did not start");
        format!("http://{addr}")
    }

    /// Cancel the context and wait for `run` to return.
    pub async fn stop(self) -> Result<(), Error> {
        self.ctx.cancel();
        self.join().await
    }

    pub async fn join(self) -> Result<(), Error> {
        tokio::time::timeout(Duration::from_secs(10), self.task)
            .await
            .expect("server did not stop")
            .expect("server task panicked")
    }
}

/// Quota manager rejecting every charge.
#[derive(Default)]
pub struct RejectingQuota {
    pub gets: AtomicUsize,
}

#[async_trait]
impl QuotaManager for RejectingQuota {
    async fn get_tokens(&self, _num: u32, specs: &[Spec]) -> Result<(), QuotaError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        Err(QuotaError::Exhausted(
            specs.first().map(ToString::to_string).unwrap_or_default(),
        ))
    }

    async fn put_tokens(&self, _num: u32, _specs: &[Spec]) -> Result<(), QuotaError> {
        Ok(())
    }
}

/// Quota manager granting everything and recording what was charged.
#[derive(Default)]
pub struct RecordingQuota {
    pub charged: Mutex<Vec<String>>,
    pub returned: Mutex<Vec<String>>,
}

#[async_trait]
impl QuotaManager for RecordingQuota {
    async fn get_tokens(&self, _num: u32, specs: &[Spec]) -> Result<(), QuotaError> {
        let mut charged = self.charged.lock().unwrap();
        charged.extend(specs.iter().map(ToString::to_string));
        Ok(())
    }

    async fn put_tokens(&self, _num: u32, specs: &[Spec]) -> Result<(), QuotaError> {
        let mut returned = self.returned.lock().unwrap();
        returned.extend(specs.iter().map(ToString::to_string));
        Ok(())
    }
}

/// Which coordination calls should fail.
#[derive(Default, Clone, Copy)]
pub struct Failures {
    pub grant: bool,
    pub keep_alive: bool,
    pub add_endpoint: bool,
    pub delete_endpoint: bool,
    pub revoke: bool,
    /// Endpoint deletion never completes.
    pub hang_delete: bool,
}

/// In-memory coordinator. Lease loss is simulated with [`lose_lease`].
///
/// [`lose_lease`]: FakeCoordinator::lose_lease
#[derive(Default)]
pub struct FakeCoordinator {
    pub failures: Failures,
    pub calls: Mutex<Vec<String>>,
    acks: Mutex<Option<mpsc::Sender<KeepAliveAck>>>,
}

impl FakeCoordinator {
    pub fn failing(failures: Failures) -> Self {
        Self {
            failures,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    /// Deliver a renewal ack to the monitor.
    pub async fn renew(&self) {
        let sender = self.acks.lock().unwrap().clone();
        if let Some(sender) = sender {
            let _ = sender
                .send(KeepAliveAck {
                    lease: LEASE_ID,
                    ttl: 30,
                })
                .await;
        }
    }

    /// Close the keepalive stream, as a failed renewal does.
    pub fn lose_lease(&self) {
        self.acks.lock().unwrap().take();
    }
}

fn unavailable(what: &str) -> CoordinationError {
    CoordinationError::Unavailable(format!("{what} failed"))
}

#[async_trait]
impl Coordinator for FakeCoordinator {
    async fn grant(&self, ttl_secs: i64) -> Result<LeaseId, CoordinationError> {
        self.record(format!("grant {ttl_secs}"));
        if self.failures.grant {
            return Err(unavailable("grant"));
        }
        Ok(LEASE_ID)
    }

    async fn keep_alive(
        &self,
        lease: LeaseId,
    ) -> Result<mpsc::Receiver<KeepAliveAck>, CoordinationError> {
        self.record(format!("keep_alive {lease}"));
        if self.failures.keep_alive {
            return Err(unavailable("keep_alive"));
        }
        let (tx, rx) = mpsc::channel(4);
        *self.acks.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn add_endpoint(
        &self,
        key: &str,
        addr: &str,
        lease: LeaseId,
    ) -> Result<(), CoordinationError> {
        self.record(format!("add {key} {addr} {lease}"));
        if self.failures.add_endpoint {
            return Err(unavailable("add_endpoint"));
        }
        Ok(())
    }

    async fn delete_endpoint(&self, key: &str) -> Result<(), CoordinationError> {
        self.record(format!("delete {key}"));
        if self.failures.hang_delete {
            std::future::pending::<()>().await;
        }
        if self.failures.delete_endpoint {
            return Err(unavailable("delete_endpoint"));
        }
        Ok(())
    }

    async fn revoke(&self, lease: LeaseId) -> Result<(), CoordinationError> {
        self.record(format!("revoke {lease}"));
        // Revoking ends renewal.
        self.acks.lock().unwrap().take();
        if self.failures.revoke {
            return Err(unavailable("revoke"));
        }
        Ok(())
    }
}

/// A cancel callback counting its invocations.
pub fn counting_cancel() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = count.clone();
    (count, move || {
        seen.fetch_add(1, Ordering::SeqCst);
    })
}
