//! Storage interfaces consumed by the server core.
//!
//! # Data Flow
//! ```text
//! Admin RPCs (admin/service.rs) ─┐
//!                                ├─→ AdminStorage ─→ backend (memory.rs, SQL, ...)
//! Deleted tree GC (admin/gc.rs) ─┘
//!
//! SQL backends:
//!     statement template → stmt_cache.rs (expand + prepare once) → Stmt
//! ```
//!
//! # Design Decisions
//! - Trees are soft-deleted first; only soft-deleted trees may be hard-deleted
//! - Implementations own their concurrency safety
//! - Every operation is independently idempotent from the caller's view

pub mod memory;
pub mod stmt_cache;

use std::time::SystemTime;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use memory::MemoryStorage;

/// Kind of logical tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TreeType {
    Log,
    PreorderedLog,
    Map,
}

impl std::fmt::Display for TreeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TreeType::Log => write!(f, "LOG"),
            TreeType::PreorderedLog => write!(f, "PREORDERED_LOG"),
            TreeType::Map => write!(f, "MAP"),
        }
    }
}

/// Serving state of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TreeState {
    #[default]
    Active,
    Frozen,
    Draining,
}

/// A logical tree as seen by the admin surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    /// Assigned by storage on creation; zero in create requests.
    #[serde(default)]
    pub tree_id: i64,
    pub tree_type: TreeType,
    #[serde(default)]
    pub tree_state: TreeState,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub create_time: Option<SystemTime>,
    #[serde(default)]
    pub update_time: Option<SystemTime>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub delete_time: Option<SystemTime>,
}

impl Tree {
    pub fn new(tree_type: TreeType) -> Self {
        Self {
            tree_id: 0,
            tree_type,
            tree_state: TreeState::Active,
            display_name: String::new(),
            description: String::new(),
            create_time: None,
            update_time: None,
            deleted: false,
            delete_time: None,
        }
    }
}

/// Mutable subset of a tree. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeUpdate {
    pub tree_state: Option<TreeState>,
    pub display_name: Option<String>,
    pub description: Option<String>,
}

/// Errors returned by storage implementations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StorageError {
    #[error("tree {tree_id} not found")]
    NotFound { tree_id: i64 },
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("internal storage error: {0}")]
    Internal(String),
}

/// Tree metadata storage used by the admin service and the deleted tree GC.
#[async_trait]
pub trait AdminStorage: Send + Sync {
    /// List trees, optionally including soft-deleted ones.
    async fn list_trees(&self, include_deleted: bool) -> Result<Vec<Tree>, StorageError>;

    async fn get_tree(&self, tree_id: i64) -> Result<Tree, StorageError>;

    /// Create a tree; storage assigns the ID and timestamps.
    async fn create_tree(&self, tree: Tree) -> Result<Tree, StorageError>;

    async fn update_tree(&self, tree_id: i64, update: TreeUpdate) -> Result<Tree, StorageError>;

    /// Mark a tree deleted, recording the deletion time.
    async fn soft_delete_tree(&self, tree_id: i64) -> Result<Tree, StorageError>;

    async fn undelete_tree(&self, tree_id: i64) -> Result<Tree, StorageError>;

    /// Permanently remove a soft-deleted tree.
    async fn hard_delete_tree(&self, tree_id: i64) -> Result<(), StorageError>;
}
