//! In-memory graph store
//!
//! Used by tests and by callers that only need a throwaway graph. Write
//! batches are applied to a copy of the graph which replaces the live one
//! only when every write succeeded. Every query issued through a session is
//! counted, so tests can assert how many round trips an operation made.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, RwLock};

use super::{
    rank_modules, GraphSession, GraphStore, GraphWrite, GraphWriteBatch, ModuleEdges, ModuleMatch,
    ModuleQuery, SessionPool, StoreError, StoreResult,
};
use crate::model::{DependencyEdge, ModuleNode, PartNode};

#[derive(Debug, Clone, Default)]
struct GraphState {
    modules: BTreeMap<String, ModuleNode>,
    /// Keyed by `(part_id, module_id)`
    parts: BTreeMap<(String, String), PartNode>,
    /// `(module_id, part_id)`
    memberships: BTreeSet<(String, String)>,
    /// Keyed by `(from_module, to_module)`
    dependencies: BTreeMap<(String, String), DependencyEdge>,
}

impl GraphState {
    fn apply(&mut self, write: &GraphWrite) -> StoreResult<()> {
        match write {
            GraphWrite::UpsertModule(node) => {
                self.modules.insert(node.module_id.clone(), node.clone());
            }
            GraphWrite::UpsertPart(part) => {
                self.parts
                    .insert((part.part_id.clone(), part.module_id.clone()), part.clone());
            }
            GraphWrite::LinkPart { module_id, part_id } => {
                if !self.modules.contains_key(module_id) {
                    return Err(StoreError::Transaction(format!(
                        "module '{}' does not exist",
                        module_id
                    )));
                }
                if !self.parts.contains_key(&(part_id.clone(), module_id.clone())) {
                    return Err(StoreError::Transaction(format!(
                        "part '{}' of module '{}' does not exist",
                        part_id, module_id
                    )));
                }
                self.memberships.insert((module_id.clone(), part_id.clone()));
            }
            GraphWrite::LinkDependency(edge) => {
                for endpoint in [&edge.from_module, &edge.to_module] {
                    if !self.modules.contains_key(endpoint) {
                        return Err(StoreError::Transaction(format!(
                            "module '{}' does not exist",
                            endpoint
                        )));
                    }
                }
                self.dependencies
                    .insert((edge.from_module.clone(), edge.to_module.clone()), edge.clone());
            }
        }
        Ok(())
    }
}

/// Graph held in process memory
#[derive(Clone)]
pub struct MemoryGraphStore {
    state: Arc<RwLock<GraphState>>,
    pool: SessionPool,
    queries: Arc<AtomicUsize>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::with_max_sessions(8)
    }

    pub fn with_max_sessions(max_sessions: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(GraphState::default())),
            pool: SessionPool::new(max_sessions),
            queries: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Total queries issued through sessions of this store
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Snapshot of a module node
    pub async fn module(&self, module_id: &str) -> Option<ModuleNode> {
        self.state.read().await.modules.get(module_id).cloned()
    }

    /// Part ids linked to a module, sorted
    pub async fn module_parts(&self, module_id: &str) -> Vec<String> {
        self.state
            .read()
            .await
            .memberships
            .iter()
            .filter(|(owner, _)| owner == module_id)
            .map(|(_, part)| part.clone())
            .collect()
    }

    pub async fn part_count(&self) -> usize {
        self.state.read().await.parts.len()
    }

    pub async fn dependency_count(&self) -> usize {
        self.state.read().await.dependencies.len()
    }
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn session(&self) -> StoreResult<Box<dyn GraphSession>> {
        let permit = self.pool.acquire().await?;
        Ok(Box::new(MemorySession {
            state: Arc::clone(&self.state),
            queries: Arc::clone(&self.queries),
            _permit: permit,
        }))
    }

    fn active_sessions(&self) -> usize {
        self.pool.in_use()
    }

    async fn close(&self) -> StoreResult<()> {
        self.pool.close();
        Ok(())
    }
}

struct MemorySession {
    state: Arc<RwLock<GraphState>>,
    queries: Arc<AtomicUsize>,
    _permit: OwnedSemaphorePermit,
}

impl MemorySession {
    fn count_query(&self) {
        self.queries.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl GraphSession for MemorySession {
    async fn clear_all(&mut self) -> StoreResult<()> {
        self.count_query();
        *self.state.write().await = GraphState::default();
        Ok(())
    }

    async fn commit(&mut self, batch: GraphWriteBatch) -> StoreResult<()> {
        self.count_query();
        let mut state = self.state.write().await;
        let mut staged = state.clone();
        for write in batch.writes() {
            staged.apply(write)?;
        }
        *state = staged;
        Ok(())
    }

    async fn stored_hashes(&mut self) -> StoreResult<HashMap<String, String>> {
        self.count_query();
        Ok(self
            .state
            .read()
            .await
            .modules
            .values()
            .map(|node| (node.module_id.clone(), node.contract_file_hash.clone()))
            .collect())
    }

    async fn module_exists(&mut self, module_id: &str) -> StoreResult<bool> {
        self.count_query();
        Ok(self.state.read().await.modules.contains_key(module_id))
    }

    async fn dependency_edges(&mut self, module_id: &str) -> StoreResult<ModuleEdges> {
        self.count_query();
        let state = self.state.read().await;
        let mut edges = ModuleEdges::default();
        for ((from, to), edge) in &state.dependencies {
            if from == module_id {
                edges.outgoing.push(edge.clone());
            }
            if to == module_id {
                edges.incoming.push(edge.clone());
            }
        }
        Ok(edges)
    }

    async fn find_modules(&mut self, query: &ModuleQuery) -> StoreResult<Vec<ModuleMatch>> {
        self.count_query();
        let state = self.state.read().await;
        Ok(rank_modules(state.modules.values().cloned(), query))
    }

    async fn module_count(&mut self) -> StoreResult<usize> {
        self.count_query();
        Ok(self.state.read().await.modules.len())
    }
}
