//! Quota enforcement stage.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;

use crate::observability::metrics;
use crate::quota::{Group, Kind, QuotaManager, Spec};
use crate::rpc::interceptor::{method_name, CHARGE_TO_HEADER, TREE_ID_HEADER};
use crate::rpc::status::{RpcError, Status};
use crate::rpc::MethodKind;

/// Response header set when dry-run quota would have rejected the call.
pub const DRY_RUN_REJECTED: &str = "x-quota-dry-run-rejected";

/// Tokens charged per call.
const TOKENS_PER_CALL: u32 = 1;

/// State for the quota stage.
pub struct QuotaState {
    manager: Arc<dyn QuotaManager>,
    dry_run: bool,
    methods: Arc<DashMap<String, MethodKind>>,
}

impl QuotaState {
    pub fn new(
        manager: Arc<dyn QuotaManager>,
        dry_run: bool,
        methods: Arc<DashMap<String, MethodKind>>,
    ) -> Self {
        Self {
            manager,
            dry_run,
            methods,
        }
    }
}

/// Quota buckets charged for a call of `kind` with the given metadata.
pub fn specs_for(kind: Kind, headers: &HeaderMap) -> Result<Vec<Spec>, Status> {
    let mut specs = Vec::new();

    if let Some(users) = headers.get(CHARGE_TO_HEADER) {
        let users = users
            .to_str()
            .map_err(|_| Status::invalid_argument(format!("{CHARGE_TO_HEADER} is not valid text")))?;
        for user in users.split(',').map(str::trim).filter(|u| !u.is_empty()) {
            specs.push(Spec::new(Group::User(user.to_string()), kind));
        }
    }

    if let Some(tree_id) = headers.get(TREE_ID_HEADER) {
        let tree_id = tree_id
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .ok_or_else(|| Status::invalid_argument(format!("{TREE_ID_HEADER} must be an integer")))?;
        specs.push(Spec::new(Group::Tree(tree_id), kind));
    }

    specs.push(Spec::new(Group::Global, kind));
    Ok(specs)
}

pub async fn quota_middleware(
    State(state): State<Arc<QuotaState>>,
    request: Request,
    next: Next,
) -> Response {
    let method = method_name(request.uri().path()).to_string();
    let kind = match state.methods.get(&method).map(|r| *r.value()) {
        Some(MethodKind::Read) => Kind::Read,
        Some(MethodKind::Write) => Kind::Write,
        // Admin calls and unknown methods are not charged.
        Some(MethodKind::Admin) | None => return next.run(request).await,
    };

    let specs = match specs_for(kind, request.headers()) {
        Ok(specs) => specs,
        Err(status) => return status.into_response(),
    };

    let mut dry_run_rejected = false;
    let charged = match state.manager.get_tokens(TOKENS_PER_CALL, &specs).await {
        Ok(()) => {
            metrics::record_quota_acquired(TOKENS_PER_CALL);
            true
        }
        Err(e) if state.dry_run => {
            tracing::info!(method = %method, error = %e, "Quota dry-run: call would be rejected");
            metrics::record_quota_dry_run_rejection(&method);
            dry_run_rejected = true;
            false
        }
        Err(e) => {
            tracing::debug!(method = %method, error = %e, "Quota rejected call");
            return RpcError::from(e).into_response();
        }
    };

    let mut response = next.run(request).await;

    // Writes that failed did not consume what they were charged for.
    if charged && kind == Kind::Write && !response.status().is_success() {
        match state.manager.put_tokens(TOKENS_PER_CALL, &specs).await {
            Ok(()) => metrics::record_quota_returned(TOKENS_PER_CALL),
            Err(e) => {
                tracing::warn!(method = %method, error = %e, "Failed to return quota tokens")
            }
        }
    }

    if dry_run_rejected {
        response
            .headers_mut()
            .insert(DRY_RUN_REJECTED, HeaderValue::from_static("true"));
    }
    response
}
