//! Statistics capture stage.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use dashmap::DashMap;

use crate::config::DryRunStats;
use crate::observability::metrics;
use crate::rpc::interceptor::{method_name, DRY_RUN_REJECTED};
use crate::rpc::status::Code;
use crate::rpc::MethodKind;

/// Label shared by all calls to methods that are not registered.
pub const UNKNOWN_METHOD: &str = "unknown";

/// Per-method call outcomes.
///
/// Every call is exported as metrics; counts are also kept in process so the
/// server can report them without a scrape. Calls to unregistered methods
/// are all recorded under [`UNKNOWN_METHOD`].
pub struct RpcStats {
    prefix: String,
    dry_run_stats: DryRunStats,
    methods: Arc<DashMap<String, MethodKind>>,
    counts: DashMap<(String, Code), u64>,
}

impl RpcStats {
    pub fn new(
        prefix: &str,
        dry_run_stats: DryRunStats,
        methods: Arc<DashMap<String, MethodKind>>,
    ) -> Self {
        Self {
            prefix: prefix.to_string(),
            dry_run_stats,
            methods,
            counts: DashMap::new(),
        }
    }

    /// Label a call to `path` is recorded under.
    fn label(&self, path: &str) -> String {
        let method = method_name(path);
        if self.methods.contains_key(method) {
            method.to_string()
        } else {
            UNKNOWN_METHOD.to_string()
        }
    }

    /// Number of distinct methods with recorded calls.
    pub fn methods_seen(&self) -> usize {
        self.counts
            .iter()
            .map(|r| r.key().0.clone())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Number of calls to `method` that finished with `code`.
    pub fn count(&self, method: &str, code: Code) -> u64 {
        self.counts
            .get(&(method.to_string(), code))
            .map(|r| *r.value())
            .unwrap_or(0)
    }

    /// Total calls recorded for `method`, any outcome.
    pub fn total(&self, method: &str) -> u64 {
        self.counts
            .iter()
            .filter(|r| r.key().0 == method)
            .map(|r| *r.value())
            .sum()
    }

    fn record(&self, method: &str, code: Code, start: Instant) {
        *self.counts.entry((method.to_string(), code)).or_insert(0) += 1;
        metrics::record_rpc(&self.prefix, method, code.as_str(), start);
    }
}

pub async fn stats_middleware(
    State(stats): State<Arc<RpcStats>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = stats.label(request.uri().path());

    let response = next.run(request).await;

    let mut code = response
        .extensions()
        .get::<Code>()
        .copied()
        .unwrap_or_else(|| Code::from_http(response.status()));
    if stats.dry_run_stats == DryRunStats::RecordRejection
        && response.headers().contains_key(DRY_RUN_REJECTED)
    {
        code = Code::ResourceExhausted;
    }

    tracing::debug!(
        method = %method,
        code = %code,
        latency_ms = start.elapsed().as_millis() as u64,
        "RPC completed"
    );
    stats.record(&method, code, start);
    response
}
