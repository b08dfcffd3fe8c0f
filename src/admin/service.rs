//! Tree administration RPCs.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::rpc::{MethodKind, RpcError, RpcServer, Status};
use crate::storage::{AdminStorage, Tree, TreeType, TreeUpdate};

pub const SERVICE: &str = "logserver.Admin";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTreeRequest {
    pub tree: Tree,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetTreeRequest {
    pub tree_id: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ListTreesRequest {
    pub show_deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListTreesResponse {
    pub trees: Vec<Tree>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTreeRequest {
    pub tree_id: i64,
    #[serde(default)]
    pub update: TreeUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteTreeRequest {
    pub tree_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndeleteTreeRequest {
    pub tree_id: i64,
}

/// Admin service over an [`AdminStorage`].
pub struct AdminService {
    storage: Arc<dyn AdminStorage>,
    /// Empty allows every type.
    allowed_tree_types: Vec<TreeType>,
}

impl AdminService {
    pub fn new(storage: Arc<dyn AdminStorage>, allowed_tree_types: Vec<TreeType>) -> Self {
        Self {
            storage,
            allowed_tree_types,
        }
    }

    pub async fn create_tree(&self, request: CreateTreeRequest) -> Result<Tree, RpcError> {
        let tree_type = request.tree.tree_type;
        if !self.allowed_tree_types.is_empty() && !self.allowed_tree_types.contains(&tree_type) {
            return Err(Status::invalid_argument(format!(
                "tree type {tree_type} is not allowed by this server"
            ))
            .into());
        }
        let tree = self.storage.create_tree(request.tree).await?;
        tracing::info!(tree_id = tree.tree_id, tree_type = %tree.tree_type, "Tree created");
        Ok(tree)
    }

    pub async fn get_tree(&self, request: GetTreeRequest) -> Result<Tree, RpcError> {
        Ok(self.storage.get_tree(request.tree_id).await?)
    }

    pub async fn list_trees(&self, request: ListTreesRequest) -> Result<ListTreesResponse, RpcError> {
        let trees = self.storage.list_trees(request.show_deleted).await?;
        Ok(ListTreesResponse { trees })
    }

    pub async fn update_tree(&self, request: UpdateTreeRequest) -> Result<Tree, RpcError> {
        Ok(self.storage.update_tree(request.tree_id, request.update).await?)
    }

    pub async fn delete_tree(&self, request: DeleteTreeRequest) -> Result<Tree, RpcError> {
        let tree = self.storage.soft_delete_tree(request.tree_id).await?;
        tracing::info!(tree_id = tree.tree_id, "Tree soft-deleted");
        Ok(tree)
    }

    pub async fn undelete_tree(&self, request: UndeleteTreeRequest) -> Result<Tree, RpcError> {
        let tree = self.storage.undelete_tree(request.tree_id).await?;
        tracing::info!(tree_id = tree.tree_id, "Tree undeleted");
        Ok(tree)
    }

    /// Register every admin method on `server`.
    pub fn register(self, server: &mut RpcServer) -> Result<(), Error> {
        let service = Arc::new(self);

        let s = service.clone();
        server.add_method(SERVICE, "CreateTree", MethodKind::Admin, move |req: CreateTreeRequest| {
            let s = s.clone();
            async move { s.create_tree(req).await }
        })?;

        let s = service.clone();
        server.add_method(SERVICE, "GetTree", MethodKind::Admin, move |req: GetTreeRequest| {
            let s = s.clone();
            async move { s.get_tree(req).await }
        })?;

        let s = service.clone();
        server.add_method(SERVICE, "ListTrees", MethodKind::Admin, move |req: ListTreesRequest| {
            let s = s.clone();
            async move { s.list_trees(req).await }
        })?;

        let s = service.clone();
        server.add_method(SERVICE, "UpdateTree", MethodKind::Admin, move |req: UpdateTreeRequest| {
            let s = s.clone();
            async move { s.update_tree(req).await }
        })?;

        let s = service.clone();
        server.add_method(SERVICE, "DeleteTree", MethodKind::Admin, move |req: DeleteTreeRequest| {
            let s = s.clone();
            async move { s.delete_tree(req).await }
        })?;

        let s = service;
        server.add_method(SERVICE, "UndeleteTree", MethodKind::Admin, move |req: UndeleteTreeRequest| {
            let s = s.clone();
            async move { s.undelete_tree(req).await }
        })
    }
}
