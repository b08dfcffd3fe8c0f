//! Prepared statement reuse for SQL-backed storage.
//!
//! Statement templates carry a single [`PLACEHOLDER`] marker that is expanded
//! into `first` followed by `num - 1` copies of `rest`, so one template serves
//! any number of bound rows:
//!
//! ```text
//! "SELECT * FROM Trees WHERE TreeId IN (<placeholder>)", 3, "?", ",?"
//!     → "SELECT * FROM Trees WHERE TreeId IN (?,?,?)"
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::storage::StorageError;

/// Marker replaced by the expanded bind parameter list.
pub const PLACEHOLDER: &str = "<placeholder>";

/// A value bound to a statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Text(String),
    Bytes(Vec<u8>),
}

/// A prepared statement.
///
/// Implementations must be safe for concurrent use: the cache hands the same
/// handle to every caller of the same expanded statement.
#[async_trait]
pub trait Stmt: Send + Sync {
    /// Transaction type the statement can be rebound to.
    type Tx: Send + Sync;
    /// Row type produced by queries.
    type Row: Send;

    /// Execute the statement, returning the number of affected rows.
    async fn execute(&self, args: &[SqlValue]) -> Result<u64, StorageError>;

    async fn query(&self, args: &[SqlValue]) -> Result<Vec<Self::Row>, StorageError>;

    /// Run a query expected to produce at most one row. Extra rows are discarded.
    async fn query_row(&self, args: &[SqlValue]) -> Result<Option<Self::Row>, StorageError>;

    /// Return a transaction-specific statement built from this one.
    fn with_tx(&self, tx: &Self::Tx) -> Self
    where
        Self: Sized;

    async fn close(&self) -> Result<(), StorageError>;
}

/// Source of prepared statements, usually a connection pool.
#[async_trait]
pub trait Prepare: Send + Sync {
    type Stmt: Stmt;

    async fn prepare(&self, sql: &str) -> Result<Self::Stmt, StorageError>;
}

/// Cache of prepared statements keyed by template and parameter count.
#[async_trait]
pub trait StmtCache: Send + Sync {
    type Stmt: Stmt;

    async fn get_stmt(
        &self,
        statement: &str,
        num: usize,
        first: &str,
        rest: &str,
    ) -> Result<Arc<Self::Stmt>, StorageError>;
}

/// Expand the first [`PLACEHOLDER`] in `statement`.
pub fn expand_placeholders(
    statement: &str,
    num: usize,
    first: &str,
    rest: &str,
) -> Result<String, StorageError> {
    if num == 0 {
        return Err(StorageError::InvalidArgument(
            "statement needs at least one bound parameter".to_string(),
        ));
    }
    let mut parameters = String::with_capacity(first.len() + rest.len() * (num - 1));
    parameters.push_str(first);
    for _ in 1..num {
        parameters.push_str(rest);
    }
    Ok(statement.replacen(PLACEHOLDER, &parameters, 1))
}

/// [`StmtCache`] that prepares each expanded statement once.
pub struct PreparedCache<P: Prepare> {
    preparer: P,
    stmts: DashMap<String, Arc<P::Stmt>>,
}

impl<P: Prepare> PreparedCache<P> {
    pub fn new(preparer: P) -> Self {
        Self {
            preparer,
            stmts: DashMap::new(),
        }
    }

    /// Number of distinct statements currently cached.
    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    /// Close and forget every cached statement.
    pub async fn close_all(&self) {
        let keys: Vec<String> = self.stmts.iter().map(|r| r.key().clone()).collect();
        for key in keys {
            if let Some((sql, stmt)) = self.stmts.remove(&key) {
                if let Err(e) = stmt.close().await {
                    tracing::warn!(sql = %sql, error = %e, "Failed to close prepared statement");
                }
            }
        }
    }
}

#[async_trait]
impl<P: Prepare> StmtCache for PreparedCache<P> {
    type Stmt = P::Stmt;

    async fn get_stmt(
        &self,
        statement: &str,
        num: usize,
        first: &str,
        rest: &str,
    ) -> Result<Arc<P::Stmt>, StorageError> {
        let sql = expand_placeholders(statement, num, first, rest)?;
        if let Some(stmt) = self.stmts.get(&sql) {
            return Ok(stmt.clone());
        }

        let prepared = Arc::new(self.preparer.prepare(&sql).await?);
        // Another caller may have prepared the same text while we awaited.
        let (stmt, redundant) = match self.stmts.entry(sql) {
            Entry::Occupied(existing) => (existing.get().clone(), Some(prepared)),
            Entry::Vacant(slot) => (slot.insert(prepared).clone(), None),
        };
        if let Some(redundant) = redundant {
            if let Err(e) = redundant.close().await {
                tracing::debug!(error = %e, "Failed to close redundant statement");
            }
        }
        Ok(stmt)
    }
}
