//! `/healthz` responder.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::error::BoxError;

/// Body returned when the readiness check does not finish in time.
pub const DEADLINE_EXCEEDED: &str = "deadline exceeded";

/// A caller-supplied probe of whether the server can do useful work.
#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    async fn check(&self) -> Result<(), BoxError>;
}

#[async_trait]
impl<F> ReadinessCheck for F
where
    F: Fn() -> Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send>> + Send + Sync,
{
    async fn check(&self) -> Result<(), BoxError> {
        self().await
    }
}

#[derive(Clone)]
pub struct HealthReporter {
    check: Option<Arc<dyn ReadinessCheck>>,
    deadline: Duration,
}

impl HealthReporter {
    pub fn new(check: Option<Arc<dyn ReadinessCheck>>, deadline: Duration) -> Self {
        Self { check, deadline }
    }

    /// Run the readiness check, if any, and render the result.
    pub async fn report(&self) -> Response {
        let Some(check) = &self.check else {
            return (StatusCode::OK, "ok").into_response();
        };

        match tokio::time::timeout(self.deadline, check.check()).await {
            Ok(Ok(())) => (StatusCode::OK, "ok").into_response(),
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "Readiness check failed");
                (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
            }
            Err(_) => {
                tracing::warn!(deadline = ?self.deadline, "Readiness check timed out");
                (StatusCode::SERVICE_UNAVAILABLE, DEADLINE_EXCEEDED).into_response()
            }
        }
    }

    /// A router serving `GET /healthz`.
    pub fn router(self) -> Router {
        Router::new()
            .route("/healthz", get(healthz))
            .with_state(self)
    }
}

async fn healthz(State(reporter): State<HealthReporter>) -> Response {
    reporter.report().await
}
