//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::storage::TreeType;

/// Minimum time a tree has to remain soft-deleted before being hard-deleted.
pub const DEFAULT_TREE_DELETE_THRESHOLD: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Minimum interval between deleted tree GC sweeps. Actual runs happen
/// randomly in `[min_interval, 2 * min_interval)`.
pub const DEFAULT_TREE_DELETE_MIN_INTERVAL: Duration = Duration::from_secs(4 * 60 * 60);

/// Default deadline for readiness checks behind `/healthz`.
pub const DEFAULT_HEALTHY_DEADLINE: Duration = Duration::from_secs(5);

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// RPC listener address (e.g., "127.0.0.1:8090").
    pub rpc_endpoint: String,

    /// HTTP side-channel address for `/metrics` and `/healthz`. Not bound when unset.
    pub http_endpoint: Option<String>,

    /// Transport security for both listeners.
    pub tls: TlsConfig,

    /// Prefix for RPC statistics metric names.
    pub stats_prefix: String,

    pub quota: QuotaConfig,

    /// Maximum time to wait for the readiness check behind `/healthz`.
    /// Zero selects the default.
    pub healthy_deadline_secs: u64,

    /// Tree types the admin service may create. Empty means unrestricted.
    pub allowed_tree_types: Vec<TreeType>,

    pub tree_gc: TreeGcConfig,

    pub shutdown: ShutdownConfig,

    pub discovery: DiscoveryConfig,

    pub observability: ObservabilityConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            rpc_endpoint: "127.0.0.1:8090".to_string(),
            http_endpoint: Some("127.0.0.1:8091".to_string()),
            tls: TlsConfig::default(),
            stats_prefix: "log".to_string(),
            quota: QuotaConfig::default(),
            healthy_deadline_secs: DEFAULT_HEALTHY_DEADLINE.as_secs(),
            allowed_tree_types: Vec::new(),
            tree_gc: TreeGcConfig::default(),
            shutdown: ShutdownConfig::default(),
            discovery: DiscoveryConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn healthy_deadline(&self) -> Duration {
        match self.healthy_deadline_secs {
            0 => DEFAULT_HEALTHY_DEADLINE,
            secs => Duration::from_secs(secs),
        }
    }
}

/// Certificate and key files (PEM). Both or neither must be set.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
}

impl TlsConfig {
    pub fn is_configured(&self) -> bool {
        self.cert_file.is_some() || self.key_file.is_some()
    }
}

/// How statistics capture reports calls that dry-run quota would have rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DryRunStats {
    /// Record the call's real outcome; rejections only show up in the
    /// dedicated dry-run counter.
    #[default]
    RecordOutcome,
    /// Record the call as `resource_exhausted`, as if quota had been enforced.
    RecordRejection,
}

/// Quota enforcement settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Log and count quota rejections without blocking calls.
    pub dry_run: bool,

    pub dry_run_stats: DryRunStats,
}

/// Deleted tree garbage collection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TreeGcConfig {
    pub enabled: bool,

    /// Minimum age of a soft-deletion before the tree is hard-deleted.
    pub delete_threshold_secs: u64,

    /// Minimum interval between sweeps.
    pub min_interval_secs: u64,
}

impl Default for TreeGcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delete_threshold_secs: DEFAULT_TREE_DELETE_THRESHOLD.as_secs(),
            min_interval_secs: DEFAULT_TREE_DELETE_MIN_INTERVAL.as_secs(),
        }
    }
}

impl TreeGcConfig {
    pub fn delete_threshold(&self) -> Duration {
        Duration::from_secs(self.delete_threshold_secs)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_secs)
    }
}

/// Shutdown timing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Time given to background tasks after the RPC listener returns.
    pub grace_period_secs: u64,

    /// Upper bound on draining in-flight connections during graceful stop.
    pub drain_timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 5,
            drain_timeout_secs: 10,
        }
    }
}

impl ShutdownConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

/// Service discovery through etcd.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// etcd endpoints. Announcement is disabled when empty.
    pub etcd_servers: Vec<String>,

    /// Service name the RPC endpoint is registered under.
    pub service: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            etcd_servers: Vec::new(),
            service: "logserver".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}
