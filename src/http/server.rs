//! HTTP side-channel server.
//!
//! # Responsibilities
//! - Expose `/metrics` and `/healthz`
//! - Serve plaintext or TLS depending on configuration
//! - Stop with the shared shutdown handle

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;

use crate::health::HealthReporter;
use crate::net::listener;

/// Router and transport settings for the side-channel.
pub struct HttpServer {
    router: Router,
    tls: Option<RustlsConfig>,
}

impl HttpServer {
    pub fn new(metrics: PrometheusHandle, health: HealthReporter, tls: Option<RustlsConfig>) -> Self {
        let router = Router::new()
            .route("/metrics", get(render_metrics))
            .with_state(metrics)
            .merge(health.router())
            .layer(TraceLayer::new_for_http());
        Self { router, tls }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `address` until `handle` shuts down.
    ///
    /// Errors are logged, not returned: the side-channel is best effort.
    pub async fn run(self, address: String, handle: Handle) {
        let listener = match listener::bind(&address).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!(address = %address, error = %e, "HTTP side-channel failed to bind");
                return;
            }
        };

        tracing::info!(address = %address, tls = self.tls.is_some(), "HTTP side-channel starting");
        let app = self.router.into_make_service();
        let result = match self.tls {
            Some(tls) => {
                axum_server::from_tcp_rustls(listener, tls)
                    .handle(handle)
                    .serve(app)
                    .await
            }
            None => axum_server::from_tcp(listener).handle(handle).serve(app).await,
        };

        match result {
            Ok(()) => tracing::info!(address = %address, "HTTP side-channel stopped"),
            Err(e) => tracing::error!(address = %address, error = %e, "HTTP side-channel failed"),
        }
    }
}

async fn render_metrics(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}
