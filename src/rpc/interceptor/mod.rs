//! Interceptor chain applied to every RPC.
//!
//! # Data Flow
//! ```text
//! inbound call
//!     → stats.rs   (latency + outcome by method and code)
//!     → errors.rs  (RpcError → public Status)
//!     → quota.rs   (charge tokens; reject, or record only in dry-run)
//!     → method handler
//! ```
//!
//! # Design Decisions
//! - Order is fixed: stats observes the normalized outcome of every call,
//!   including quota rejections, exactly once
//! - Quota rejects before the handler runs, so a rejected call never reaches
//!   handler code that could fail in some other way
//! - Stages are axum middleware; the chain is applied after all methods are
//!   registered so it wraps every route and the fallback

pub mod errors;
pub mod quota;
pub mod stats;

use std::sync::Arc;

use axum::{middleware, Router};
use dashmap::DashMap;

use crate::config::QuotaConfig;
use crate::quota::QuotaManager;
use crate::rpc::MethodKind;

pub use quota::{QuotaState, DRY_RUN_REJECTED};
pub use stats::{RpcStats, UNKNOWN_METHOD};

/// Request header naming the tree a call operates on.
pub const TREE_ID_HEADER: &str = "x-tree-id";

/// Request header listing users (comma-separated) to charge quota to.
pub const CHARGE_TO_HEADER: &str = "x-charge-to";

/// Full method name (`service/method`) for a request path.
pub fn method_name(path: &str) -> &str {
    path.trim_start_matches('/')
}

/// The composed statistics → error normalization → quota pipeline.
#[derive(Clone)]
pub struct InterceptorChain {
    stats: Arc<RpcStats>,
    quota: Arc<QuotaState>,
}

impl InterceptorChain {
    pub fn new(
        stats_prefix: &str,
        quota_config: &QuotaConfig,
        quota_manager: Arc<dyn QuotaManager>,
        methods: Arc<DashMap<String, MethodKind>>,
    ) -> Self {
        Self {
            stats: Arc::new(RpcStats::new(
                stats_prefix,
                quota_config.dry_run_stats,
                methods.clone(),
            )),
            quota: Arc::new(QuotaState::new(quota_manager, quota_config.dry_run, methods)),
        }
    }

    /// Statistics captured by the outermost stage.
    pub fn stats(&self) -> Arc<RpcStats> {
        self.stats.clone()
    }

    /// Wrap `router` with all three stages.
    pub fn apply(&self, router: Router) -> Router {
        // The last layer added runs first.
        router
            .layer(middleware::from_fn_with_state(
                self.quota.clone(),
                quota::quota_middleware,
            ))
            .layer(middleware::from_fn(errors::normalize_errors))
            .layer(middleware::from_fn_with_state(
                self.stats.clone(),
                stats::stats_middleware,
            ))
    }
}
