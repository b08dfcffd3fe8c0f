//! Shared dependencies handed to the server and to registration callbacks.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::observability::metrics;
use crate::quota::{NoopManager, QuotaManager};
use crate::storage::AdminStorage;

/// Storage, quota and metrics dependencies of a server instance.
#[derive(Clone)]
pub struct Registry {
    pub admin_storage: Arc<dyn AdminStorage>,
    pub quota_manager: Arc<dyn QuotaManager>,
    pub metrics: PrometheusHandle,
}

impl Registry {
    pub fn new(admin_storage: Arc<dyn AdminStorage>, quota_manager: Arc<dyn QuotaManager>) -> Self {
        Self {
            admin_storage,
            quota_manager,
            metrics: metrics::install(),
        }
    }

    /// A registry that grants all quota.
    pub fn with_storage(admin_storage: Arc<dyn AdminStorage>) -> Self {
        Self::new(admin_storage, Arc::new(NoopManager))
    }
}
