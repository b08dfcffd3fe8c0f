//! Error normalization stage.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::rpc::interceptor::method_name;
use crate::rpc::status::{tag, Code, RawError};

/// Replace raw handler errors with their public [`Status`](crate::rpc::Status).
///
/// Responses that already carry a code pass through untouched; anything else
/// is tagged with a code derived from its HTTP status.
pub async fn normalize_errors(request: Request, next: Next) -> Response {
    let method = method_name(request.uri().path()).to_string();
    let mut response = next.run(request).await;

    if let Some(RawError(err)) = response.extensions_mut().remove::<RawError>() {
        let status = err.to_status();
        if status.code == Code::Internal || status.code == Code::Unknown {
            tracing::warn!(method = %method, error = %err, "RPC failed with internal error");
        } else {
            tracing::debug!(method = %method, code = %status.code, error = %err, "RPC failed");
        }
        return status.into_response();
    }

    if response.extensions().get::<Code>().is_none() {
        let code = Code::from_http(response.status());
        tag(&mut response, code);
    }
    response
}
