//! Service discovery through a coordination store.
//!
//! # Data Flow
//! ```text
//! announce_self (announce.rs):
//!     grant lease (30s) → start keepalive → spawn monitor
//!     → put "<service>/<endpoint>" bound to the lease → Cleanup
//!
//! monitor:
//!     ack            → keep waiting
//!     stream closed  → lease lost → cancel (once)
//!     ctx cancelled  → exit quietly
//!
//! Cleanup::run:
//!     delete endpoint + revoke lease, each bounded by a timeout
//! ```
//!
//! # Design Decisions
//! - A lost lease is never renewed; the process shuts down instead
//! - The store is behind [`Coordinator`] so the announcer can be tested
//!   without etcd (etcd.rs is the production implementation)

pub mod announce;
pub mod etcd;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use announce::{announce_self, Cleanup};
pub use etcd::EtcdCoordinator;

/// Lease time-to-live for announced endpoints, in seconds.
pub const LEASE_TTL_SECS: i64 = 30;

pub type LeaseId = i64;

/// A successful lease renewal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAliveAck {
    pub lease: LeaseId,
    /// Remaining time-to-live in seconds.
    pub ttl: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    #[error(transparent)]
    Etcd(#[from] Box<etcd_client::Error>),
    #[error("failed to encode endpoint: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("coordination store unavailable: {0}")]
    Unavailable(String),
}

impl From<etcd_client::Error> for CoordinationError {
    fn from(e: etcd_client::Error) -> Self {
        CoordinationError::Etcd(Box::new(e))
    }
}

/// Lease and endpoint operations on a coordination store.
#[async_trait]
pub trait Coordinator: Send + Sync {
    async fn grant(&self, ttl_secs: i64) -> Result<LeaseId, CoordinationError>;

    /// Start renewing `lease`. The receiver yields one ack per renewal and
    /// closes once renewal stops for any reason.
    async fn keep_alive(&self, lease: LeaseId)
        -> Result<mpsc::Receiver<KeepAliveAck>, CoordinationError>;

    /// Register `addr` under `key`, expiring with `lease`.
    async fn add_endpoint(&self, key: &str, addr: &str, lease: LeaseId)
        -> Result<(), CoordinationError>;

    async fn delete_endpoint(&self, key: &str) -> Result<(), CoordinationError>;

    async fn revoke(&self, lease: LeaseId) -> Result<(), CoordinationError>;
}
