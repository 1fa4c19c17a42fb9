//! Graph store port
//!
//! The engine never talks to a database directly. It opens a
//! [`GraphSession`] from a [`GraphStore`], issues a fixed set of query
//! shapes against it, and drops it. Dropping a session returns its slot to
//! the store's [`SessionPool`], on every exit path.
//!
//! Write shapes: destroy-all ([`GraphSession::clear_all`]) and the four
//! upserts carried by [`GraphWrite`], committed together in one
//! [`GraphWriteBatch`]. Read shapes: stored hashes, module existence,
//! dependency edges of a module, and the similarity/filter query over
//! module nodes.

pub mod memory;
pub mod sled;

pub use self::memory::MemoryGraphStore;
pub use self::sled::SledGraphStore;

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::embedding::dot;
use crate::model::{DependencyEdge, ModuleNode, PartNode};

/// Graph store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A write batch was rejected; nothing from it was applied
    #[error("Transaction aborted: {0}")]
    Transaction(String),

    #[error("Store is closed")]
    PoolClosed,
}

impl From<::sled::Error> for StoreError {
    fn from(err: ::sled::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A single upsert
#[derive(Debug, Clone, PartialEq)]
pub enum GraphWrite {
    /// Module node keyed by `module_id`
    UpsertModule(ModuleNode),
    /// Part node keyed by `(part_id, module_id)`
    UpsertPart(PartNode),
    /// Membership edge from a module to one of its parts
    LinkPart { module_id: String, part_id: String },
    /// Directed dependency edge between two modules
    LinkDependency(DependencyEdge),
}

/// Ordered writes applied all-or-nothing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphWriteBatch {
    writes: Vec<GraphWrite>,
}

impl GraphWriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, write: GraphWrite) {
        self.writes.push(write);
    }

    pub fn writes(&self) -> &[GraphWrite] {
        &self.writes
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Similarity/filter query over module nodes
///
/// With an `embedding` the query ranks by similarity; without one it is a
/// plain attribute filter. `module_ids` restricts candidates before the
/// limit is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleQuery {
    pub embedding: Option<Vec<f32>>,
    pub module_type: Option<String>,
    pub category: Option<String>,
    pub module_ids: Option<HashSet<String>>,
    pub limit: usize,
}

impl ModuleQuery {
    fn matches(&self, node: &ModuleNode) -> bool {
        self.module_type.as_ref().map_or(true, |t| *t == node.module_type)
            && self.category.as_ref().map_or(true, |c| *c == node.category)
            && self.module_ids.as_ref().map_or(true, |ids| ids.contains(&node.module_id))
    }
}

/// A module returned by [`GraphSession::find_modules`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleMatch {
    pub module_id: String,
    pub similarity: f32,
}

/// Dependency edges touching one module
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleEdges {
    /// Edges where the module is the dependent
    pub outgoing: Vec<DependencyEdge>,
    /// Edges where the module is the dependency
    pub incoming: Vec<DependencyEdge>,
}

/// Rank or filter module nodes for a [`ModuleQuery`]
///
/// Semantic mode keeps nodes with an embedding of the query's length and a
/// positive dot product, best first. Filter-only mode orders by module id
/// and reports a similarity of `1.0`. Both modes break ties by module id
/// and stop at `query.limit`.
pub fn rank_modules<I>(nodes: I, query: &ModuleQuery) -> Vec<ModuleMatch>
where
    I: IntoIterator<Item = ModuleNode>,
{
    let candidates = nodes.into_iter().filter(|node| query.matches(node));

    let mut matches: Vec<ModuleMatch> = match &query.embedding {
        Some(target) => candidates
            .filter_map(|node| {
                let similarity = dot(node.embedding.as_deref()?, target)?;
                (similarity > 0.0).then_some(ModuleMatch {
                    module_id: node.module_id,
                    similarity,
                })
            })
            .collect(),
        None => candidates
            .map(|node| ModuleMatch {
                module_id: node.module_id,
                similarity: 1.0,
            })
            .collect(),
    };

    matches.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.module_id.cmp(&b.module_id))
    });
    matches.truncate(query.limit);
    matches
}

/// One logical unit of work against the graph
///
/// Sessions hold a pool slot until dropped.
#[async_trait]
pub trait GraphSession: Send {
    /// Destroy every node and edge
    async fn clear_all(&mut self) -> StoreResult<()>;

    /// Apply a write batch atomically
    async fn commit(&mut self, batch: GraphWriteBatch) -> StoreResult<()>;

    /// `module_id -> contract_file_hash` for every stored module
    async fn stored_hashes(&mut self) -> StoreResult<HashMap<String, String>>;

    async fn module_exists(&mut self, module_id: &str) -> StoreResult<bool>;

    /// Outgoing and incoming dependency edges of a module
    async fn dependency_edges(&mut self, module_id: &str) -> StoreResult<ModuleEdges>;

    /// Similarity or filter query over module nodes
    async fn find_modules(&mut self, query: &ModuleQuery) -> StoreResult<Vec<ModuleMatch>>;

    /// Number of stored module nodes
    async fn module_count(&mut self) -> StoreResult<usize>;
}

/// Pooled graph persistence
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Backend name for logs and status output
    fn name(&self) -> &str;

    /// Acquire a session, waiting for a free slot
    async fn session(&self) -> StoreResult<Box<dyn GraphSession>>;

    /// Sessions currently checked out
    fn active_sessions(&self) -> usize;

    /// Flush and refuse further sessions
    async fn close(&self) -> StoreResult<()>;
}

/// Bounded set of session slots
#[derive(Debug, Clone)]
pub struct SessionPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl SessionPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a slot; the slot is released when the permit drops
    pub async fn acquire(&self) -> StoreResult<OwnedSemaphorePermit> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| StoreError::PoolClosed)
    }

    pub fn in_use(&self) -> usize {
        self.capacity.saturating_sub(self.semaphore.available_permits())
    }

    pub fn close(&self) {
        self.semaphore.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, category: &str, embedding: Option<Vec<f32>>) -> ModuleNode {
        ModuleNode {
            module_id: id.to_string(),
            module_type: "service".to_string(),
            category: category.to_string(),
            description: format!("{} module", id),
            contract_file_hash: "h".to_string(),
            embedding,
        }
    }

    fn query(embedding: Option<Vec<f32>>, category: Option<&str>, limit: usize) -> ModuleQuery {
        ModuleQuery {
            embedding,
            module_type: None,
            category: category.map(str::to_string),
            module_ids: None,
            limit,
        }
    }

    #[test]
    fn test_rank_semantic_orders_by_similarity() {
        let nodes = vec![
            node("low", "backend", Some(vec![0.6, 0.8])),
            node("high", "backend", Some(vec![1.0, 0.0])),
            node("opposite", "backend", Some(vec![-1.0, 0.0])),
            node("bare", "backend", None),
            node("short", "backend", Some(vec![1.0])),
        ];
        let ranked = rank_modules(nodes, &query(Some(vec![1.0, 0.0]), None, 10));
        let ids: Vec<_> = ranked.iter().map(|m| m.module_id.as_str()).collect();
        assert_eq!(ids, vec!["high", "low"]);
        assert!((ranked[1].similarity - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_rank_ties_break_by_module_id() {
        let nodes = vec![
            node("b", "backend", Some(vec![1.0, 0.0])),
            node("a", "backend", Some(vec![1.0, 0.0])),
        ];
        let ranked = rank_modules(nodes, &query(Some(vec![1.0, 0.0]), None, 1));
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].module_id, "a");
    }

    #[test]
    fn test_rank_filter_only() {
        let nodes = vec![
            node("zeta", "backend", None),
            node("alpha", "backend", Some(vec![1.0])),
            node("web", "frontend", None),
        ];
        let ranked = rank_modules(nodes, &query(None, Some("backend"), 10));
        let ids: Vec<_> = ranked.iter().map(|m| m.module_id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "zeta"]);
        assert!(ranked.iter().all(|m| m.similarity == 1.0));
    }

    #[test]
    fn test_rank_restricts_ids_before_limit() {
        let nodes = vec![
            node("a", "backend", None),
            node("b", "backend", None),
        ];
        let mut restricted = query(None, Some("backend"), 1);
        restricted.module_ids = Some(["b".to_string()].into_iter().collect());
        let ranked = rank_modules(nodes, &restricted);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].module_id, "b");
    }

    #[tokio::test]
    async fn test_session_pool_releases_on_drop() {
        let pool = SessionPool::new(2);
        let first = pool.acquire().await.unwrap();
        let _second = pool.acquire().await.unwrap();
        assert_eq!(pool.in_use(), 2);
        drop(first);
        assert_eq!(pool.in_use(), 1);
    }

    #[tokio::test]
    async fn test_closed_pool_rejects_sessions() {
        let pool = SessionPool::new(1);
        pool.close();
        assert!(matches!(pool.acquire().await, Err(StoreError::PoolClosed)));
    }
}
