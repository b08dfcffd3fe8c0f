//! Deleted tree garbage collection.
//!
//! Trees are soft-deleted by the admin service and stay recoverable until
//! they have been deleted for longer than the threshold. The GC then removes
//! them for good.
//!
//! ```text
//!   Idle ──timer──→ Sweeping ──pass done──→ Idle
//!     │                 │
//!     └──cancelled──────┴──→ Terminated
//! ```

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, SystemClock};
use crate::observability::metrics;
use crate::storage::{AdminStorage, StorageError};

/// A failure during one sweep. None of them abort the pass except `List`,
/// which leaves nothing to sweep.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("failed to list trees: {0}")]
    List(#[source] StorageError),
    #[error("tree {tree_id} is deleted but has no delete time")]
    MissingDeleteTime { tree_id: i64 },
    #[error("failed to hard-delete tree {tree_id}: {source}")]
    HardDelete {
        tree_id: i64,
        #[source]
        source: StorageError,
    },
}

impl SweepError {
    /// Metric label for this failure.
    pub fn reason(&self) -> &'static str {
        match self {
            SweepError::List(_) => "list_trees",
            SweepError::MissingDeleteTime { .. } => "missing_delete_time",
            SweepError::HardDelete { .. } => "hard_delete",
        }
    }
}

/// Result of a single pass.
#[derive(Debug, Default)]
pub struct SweepOutcome {
    pub deleted: u64,
    pub errors: Vec<SweepError>,
}

pub struct DeletedTreeGc {
    storage: Arc<dyn AdminStorage>,
    clock: Arc<dyn Clock>,
    threshold: Duration,
    min_interval: Duration,
}

impl DeletedTreeGc {
    pub fn new(storage: Arc<dyn AdminStorage>, threshold: Duration, min_interval: Duration) -> Self {
        Self {
            storage,
            clock: Arc::new(SystemClock),
            threshold,
            min_interval,
        }
    }

    /// Measure tree ages against `clock` instead of the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Wait before the next pass, uniform in `[min_interval, 2 * min_interval)`.
    pub fn next_interval(&self) -> Duration {
        if self.min_interval.is_zero() {
            return Duration::ZERO;
        }
        let jitter = rand::thread_rng().gen_range(Duration::ZERO..self.min_interval);
        self.min_interval + jitter
    }

    /// Sweep until `cancel` fires. A pass in progress is abandoned.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            threshold = ?self.threshold,
            min_interval = ?self.min_interval,
            "Deleted tree GC started"
        );

        loop {
            let wait = self.next_interval();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = self.run_once() => {
                    if outcome.errors.is_empty() {
                        tracing::debug!(deleted = outcome.deleted, "Deleted tree GC pass finished");
                    } else {
                        tracing::warn!(
                            deleted = outcome.deleted,
                            errors = outcome.errors.len(),
                            "Deleted tree GC pass finished with errors"
                        );
                    }
                }
            }
        }

        tracing::info!("Deleted tree GC stopped");
    }

    /// Run one pass: hard-delete every tree deleted strictly longer than the
    /// threshold ago.
    pub async fn run_once(&self) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();

        let trees = match self.storage.list_trees(true).await {
            Ok(trees) => trees,
            Err(e) => {
                let err = SweepError::List(e);
                tracing::warn!(error = %err, "Deleted tree GC could not list trees");
                metrics::record_tree_gc_failure(err.reason());
                outcome.errors.push(err);
                return outcome;
            }
        };

        let now = self.clock.now();
        for tree in trees.into_iter().filter(|t| t.deleted) {
            let Some(delete_time) = tree.delete_time else {
                let err = SweepError::MissingDeleteTime {
                    tree_id: tree.tree_id,
                };
                tracing::warn!(error = %err, "Skipping tree");
                metrics::record_tree_gc_failure(err.reason());
                outcome.errors.push(err);
                continue;
            };

            // A delete time in the future counts as just deleted.
            let age = now.duration_since(delete_time).unwrap_or(Duration::ZERO);
            if age <= self.threshold {
                continue;
            }

            match self.storage.hard_delete_tree(tree.tree_id).await {
                Ok(()) => {
                    tracing::info!(tree_id = tree.tree_id, age = ?age, "Tree hard-deleted");
                    outcome.deleted += 1;
                }
                Err(source) => {
                    let err = SweepError::HardDelete {
                        tree_id: tree.tree_id,
                        source,
                    };
                    tracing::warn!(error = %err, "Deleted tree GC failed on tree");
                    metrics::record_tree_gc_failure(err.reason());
                    outcome.errors.push(err);
                }
            }
        }

        if outcome.deleted > 0 {
            metrics::record_tree_gc_success(outcome.deleted);
        }
        outcome
    }
}
