//! In-memory admin storage.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;

use crate::clock::{Clock, SystemClock};
use crate::storage::{AdminStorage, StorageError, Tree, TreeUpdate};

/// A thread-safe tree store backed by a `DashMap`.
#[derive(Clone)]
pub struct MemoryStorage {
    trees: Arc<DashMap<i64, Tree>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store that stamps create/update/delete times from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            trees: Arc::new(DashMap::new()),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AdminStorage for MemoryStorage {
    async fn list_trees(&self, include_deleted: bool) -> Result<Vec<Tree>, StorageError> {
        let mut trees: Vec<Tree> = self
            .trees
            .iter()
            .filter(|r| include_deleted || !r.value().deleted)
            .map(|r| r.value().clone())
            .collect();
        trees.sort_by_key(|t| t.tree_id);
        Ok(trees)
    }

    async fn get_tree(&self, tree_id: i64) -> Result<Tree, StorageError> {
        self.trees
            .get(&tree_id)
            .map(|r| r.value().clone())
            .ok_or(StorageError::NotFound { tree_id })
    }

    async fn create_tree(&self, mut tree: Tree) -> Result<Tree, StorageError> {
        if tree.tree_id != 0 {
            return Err(StorageError::InvalidArgument(format!(
                "tree_id must not be set on creation, got {}",
                tree.tree_id
            )));
        }
        if tree.deleted || tree.delete_time.is_some() {
            return Err(StorageError::InvalidArgument(
                "cannot create a deleted tree".to_string(),
            ));
        }

        let now = self.clock.now();
        tree.create_time = Some(now);
        tree.update_time = Some(now);

        loop {
            let id = rand::thread_rng().gen_range(1..i64::MAX);
            if let Entry::Vacant(slot) = self.trees.entry(id) {
                tree.tree_id = id;
                slot.insert(tree.clone());
                tracing::debug!(tree_id = id, tree_type = %tree.tree_type, "Tree created");
                return Ok(tree);
            }
        }
    }

    async fn update_tree(&self, tree_id: i64, update: TreeUpdate) -> Result<Tree, StorageError> {
        let mut entry = self
            .trees
            .get_mut(&tree_id)
            .ok_or(StorageError::NotFound { tree_id })?;
        let tree = entry.value_mut();
        if tree.deleted {
            return Err(StorageError::FailedPrecondition(format!(
                "tree {tree_id} is soft-deleted"
            )));
        }
        if let Some(state) = update.tree_state {
            tree.tree_state = state;
        }
        if let Some(name) = update.display_name {
            tree.display_name = name;
        }
        if let Some(description) = update.description {
            tree.description = description;
        }
        tree.update_time = Some(self.clock.now());
        Ok(tree.clone())
    }

    async fn soft_delete_tree(&self, tree_id: i64) -> Result<Tree, StorageError> {
        let mut entry = self
            .trees
            .get_mut(&tree_id)
            .ok_or(StorageError::NotFound { tree_id })?;
        let tree = entry.value_mut();
        if tree.deleted {
            return Err(StorageError::FailedPrecondition(format!(
                "tree {tree_id} already soft-deleted"
            )));
        }
        tree.deleted = true;
        tree.delete_time = Some(self.clock.now());
        Ok(tree.clone())
    }

    async fn undelete_tree(&self, tree_id: i64) -> Result<Tree, StorageError> {
        let mut entry = self
            .trees
            .get_mut(&tree_id)
            .ok_or(StorageError::NotFound { tree_id })?;
        let tree = entry.value_mut();
        if !tree.deleted {
            return Err(StorageError::FailedPrecondition(format!(
                "tree {tree_id} is not soft-deleted"
            )));
        }
        tree.deleted = false;
        tree.delete_time = None;
        Ok(tree.clone())
    }

    async fn hard_delete_tree(&self, tree_id: i64) -> Result<(), StorageError> {
        match self.trees.entry(tree_id) {
            Entry::Vacant(_) => Err(StorageError::NotFound { tree_id }),
            Entry::Occupied(entry) if !entry.get().deleted => Err(
                StorageError::FailedPrecondition(format!("tree {tree_id} is not soft-deleted")),
            ),
            Entry::Occupied(entry) => {
                entry.remove();
                Ok(())
            }
        }
    }
}
