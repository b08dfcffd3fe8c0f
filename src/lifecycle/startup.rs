//! Startup orchestration.
//!
//! # Responsibilities
//! - Assemble the RPC server and attach every service before serving
//! - Start the HTTP side-channel and the deleted tree GC
//! - Bind the RPC listener and serve until a stop trigger fires
//! - Give background work a grace period before returning
//!
//! # Design Decisions
//! - Fail fast: TLS, registration and bind errors are returned before serving
//! - HTTP side-channel failures are logged, never fatal
//! - Every spawned task runs inside the orchestrator's span

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::admin::{AdminService, DeletedTreeGc};
use crate::config::ServerConfig;
use crate::error::Error;
use crate::health::{HealthReporter, ReadinessCheck};
use crate::http::HttpServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals;
use crate::net::listener;
use crate::registry::Registry;
use crate::rpc::{RegisterServer, RpcServer, ServerOption};

/// Hook releasing storage resources once serving has stopped.
pub type StorageClose = Box<dyn FnOnce() + Send>;

/// A log server process: configuration plus the dependencies it serves.
pub struct Main {
    config: ServerConfig,
    registry: Registry,
    register: Arc<dyn RegisterServer>,
    readiness: Option<Arc<dyn ReadinessCheck>>,
    options: Vec<ServerOption>,
    storage_close: Option<StorageClose>,
    span: tracing::Span,
    shutdown: Shutdown,
}

impl Main {
    pub fn new(
        config: ServerConfig,
        registry: Registry,
        register: impl RegisterServer + 'static,
    ) -> Self {
        let shutdown = Shutdown::new(config.shutdown.drain_timeout());
        Self {
            config,
            registry,
            register: Arc::new(register),
            readiness: None,
            options: Vec::new(),
            storage_close: None,
            span: tracing::info_span!("logserver"),
            shutdown,
        }
    }

    /// Check consulted by `/healthz`, bounded by the healthy deadline.
    pub fn with_readiness_check(mut self, check: impl ReadinessCheck + 'static) -> Self {
        self.readiness = Some(Arc::new(check));
        self
    }

    pub fn with_server_option(mut self, option: ServerOption) -> Self {
        self.options.push(option);
        self
    }

    /// Called once when `run` returns, after the grace period if serving began.
    ///
    /// Not called when the RPC server cannot be constructed.
    pub fn with_storage_close(mut self, close: impl FnOnce() + Send + 'static) -> Self {
        self.storage_close = Some(Box::new(close));
        self
    }

    /// Span every log line and spawned task of this server is recorded under.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    /// Handle for stopping the server or finding its listening addresses.
    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Serve until a signal arrives, `ctx` is cancelled or the listener fails.
    ///
    /// Stopping through a signal or `ctx` is not an error.
    pub async fn run(self, ctx: CancellationToken) -> Result<(), Error> {
        let span = self.span.clone();
        self.serve(ctx).instrument(span).await
    }

    async fn serve(mut self, ctx: CancellationToken) -> Result<(), Error> {
        let storage_close = self.storage_close.take();
        let options = std::mem::take(&mut self.options);

        let server = RpcServer::new(&self.config, &self.registry, options)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to create RPC server"))?;

        // Storage is closed on every path once the server exists.
        let result = self.serve_with(server, ctx).await;
        if let Some(close) = storage_close {
            close();
        }
        result
    }

    async fn serve_with(self, mut server: RpcServer, ctx: CancellationToken) -> Result<(), Error> {
        let Main {
            config,
            registry,
            register,
            readiness,
            span,
            shutdown,
            ..
        } = self;

        let healthy_deadline = config.healthy_deadline();

        register
            .register(&mut server, &registry)
            .map_err(Error::Registration)?;
        AdminService::new(
            registry.admin_storage.clone(),
            config.allowed_tree_types.clone(),
        )
        .register(&mut server)?;
        server.enable_reflection()?;
        tracing::info!(methods = server.methods().len(), "RPC services registered");

        if let Some(address) = config.http_endpoint.clone() {
            let health = HealthReporter::new(readiness, healthy_deadline);
            let http = HttpServer::new(registry.metrics.clone(), health, server.tls_config());
            tokio::spawn(
                http.run(address, shutdown.http_handle())
                    .instrument(span.clone()),
            );
        }

        let listener = match listener::bind(&config.rpc_endpoint).await {
            Ok(listener) => listener,
            Err(e) => {
                shutdown.trigger("RPC listener bind failed");
                return Err(e.into());
            }
        };

        let on_signal = tokio::spawn(
            signals::stop_on_signal(shutdown.clone(), signals::await_signal())
                .instrument(span.clone()),
        );
        let on_cancel = tokio::spawn({
            let shutdown = shutdown.clone();
            let ctx = ctx.clone();
            async move {
                ctx.cancelled().await;
                shutdown.trigger("context cancelled");
            }
            .instrument(span.clone())
        });

        let gc_cancel = ctx.child_token();
        if config.tree_gc.enabled {
            let gc = DeletedTreeGc::new(
                registry.admin_storage.clone(),
                config.tree_gc.delete_threshold(),
                config.tree_gc.min_interval(),
            );
            tokio::spawn(gc.run(gc_cancel.clone()).instrument(span.clone()));
        }

        tracing::info!(
            address = %config.rpc_endpoint,
            tls = server.is_tls(),
            "RPC server starting"
        );
        let served = server.serve(listener, shutdown.rpc_handle()).await;

        shutdown.trigger("RPC server returned");
        gc_cancel.cancel();
        on_signal.abort();
        on_cancel.abort();
        match &served {
            Ok(()) => tracing::info!("RPC server stopped"),
            Err(e) => tracing::error!(error = %e, "RPC server failed"),
        }

        let grace = config.shutdown.grace_period();
        tracing::debug!(grace = ?grace, "Waiting for background tasks");
        tokio::time::sleep(grace).await;

        served.map_err(Error::Serve)
    }
}
