//! Public error vocabulary of the RPC surface.
//!
//! Handlers return [`RpcError`], the internal representation. The error
//! normalization stage turns it into a [`Status`] before the response leaves
//! the server; a raw `RpcError` response is a 500 with no body detail.

use std::sync::Arc;

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::quota::QuotaError;
use crate::storage::StorageError;

/// Response header carrying the call's status code.
pub const STATUS_HEADER: &str = "x-rpc-status";

/// Canonical status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Code {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl Code {
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Ok => "ok",
            Code::Cancelled => "cancelled",
            Code::Unknown => "unknown",
            Code::InvalidArgument => "invalid_argument",
            Code::DeadlineExceeded => "deadline_exceeded",
            Code::NotFound => "not_found",
            Code::AlreadyExists => "already_exists",
            Code::PermissionDenied => "permission_denied",
            Code::ResourceExhausted => "resource_exhausted",
            Code::FailedPrecondition => "failed_precondition",
            Code::Aborted => "aborted",
            Code::OutOfRange => "out_of_range",
            Code::Unimplemented => "unimplemented",
            Code::Internal => "internal",
            Code::Unavailable => "unavailable",
            Code::DataLoss => "data_loss",
            Code::Unauthenticated => "unauthenticated",
        }
    }

    /// HTTP status used on the wire for this code.
    pub fn http_status(&self) -> StatusCode {
        match self {
            Code::Ok => StatusCode::OK,
            Code::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
            Code::InvalidArgument | Code::FailedPrecondition | Code::OutOfRange => {
                StatusCode::BAD_REQUEST
            }
            Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            Code::NotFound => StatusCode::NOT_FOUND,
            Code::AlreadyExists | Code::Aborted => StatusCode::CONFLICT,
            Code::PermissionDenied => StatusCode::FORBIDDEN,
            Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
            Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
            Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Code::Unauthenticated => StatusCode::UNAUTHORIZED,
            Code::Unknown | Code::Internal | Code::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Best-effort code for a response that carries no explicit status.
    pub fn from_http(status: StatusCode) -> Self {
        match status.as_u16() {
            200..=299 => Code::Ok,
            400 => Code::InvalidArgument,
            401 => Code::Unauthenticated,
            403 => Code::PermissionDenied,
            404 => Code::NotFound,
            408 | 504 => Code::DeadlineExceeded,
            409 => Code::Aborted,
            429 => Code::ResourceExhausted,
            501 => Code::Unimplemented,
            503 => Code::Unavailable,
            _ => Code::Unknown,
        }
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized call outcome as seen by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct Status {
    pub code: Code,
    pub message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::new(Code::ResourceExhausted, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(Code::Unimplemented, message)
    }
}

impl IntoResponse for Status {
    fn into_response(self) -> Response {
        let code = self.code;
        let mut response = (code.http_status(), Json(self)).into_response();
        tag(&mut response, code);
        response
    }
}

/// Attach the status code to a response as header and extension.
pub(crate) fn tag(response: &mut Response, code: Code) {
    response
        .headers_mut()
        .insert(STATUS_HEADER, HeaderValue::from_static(code.as_str()));
    response.extensions_mut().insert(code);
}

/// Internal error representation returned by RPC handlers.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Quota(#[from] QuotaError),
    #[error("malformed request: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Status(#[from] Status),
    #[error("internal error: {0}")]
    Internal(String),
}

impl RpcError {
    /// Map into the public vocabulary.
    pub fn to_status(&self) -> Status {
        match self {
            RpcError::Storage(e) => {
                let code = match e {
                    StorageError::NotFound { .. } => Code::NotFound,
                    StorageError::FailedPrecondition(_) => Code::FailedPrecondition,
                    StorageError::InvalidArgument(_) => Code::InvalidArgument,
                    StorageError::Unavailable(_) => Code::Unavailable,
                    StorageError::Internal(_) => Code::Internal,
                };
                Status::new(code, e.to_string())
            }
            RpcError::Quota(e) => {
                let code = match e {
                    QuotaError::Exhausted(_) => Code::ResourceExhausted,
                    QuotaError::Unavailable(_) => Code::Unavailable,
                };
                Status::new(code, e.to_string())
            }
            RpcError::Decode(e) => Status::invalid_argument(format!("malformed request: {e}")),
            RpcError::Status(status) => status.clone(),
            RpcError::Internal(message) => Status::new(Code::Internal, message.clone()),
        }
    }
}

/// Response extension carrying an error that has not been normalized yet.
#[derive(Debug, Clone)]
pub struct RawError(pub Arc<RpcError>);

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
        response.extensions_mut().insert(RawError(Arc::new(self)));
        response
    }
}
