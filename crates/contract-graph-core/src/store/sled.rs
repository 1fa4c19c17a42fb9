//! Persistent graph store backed by sled
//!
//! Layout, one tree per relation:
//!
//! | tree           | key                       | value                 |
//! |----------------|---------------------------|-----------------------|
//! | `modules`      | `module_id`               | JSON `ModuleNode`     |
//! | `parts`        | `part_id \0 module_id`    | JSON `PartNode`       |
//! | `memberships`  | `module_id \0 part_id`    | empty                 |
//! | `dependencies` | `from \0 to`              | JSON `DependencyEdge` |
//! | `dependents`   | `to \0 from`              | JSON `DependencyEdge` |
//!
//! A write batch runs as one multi-tree transaction and is flushed before
//! `commit` returns. `clear_all` empties the trees outside any transaction.

use std::collections::HashMap;
use std::path::Path;

use ::sled::transaction::{ConflictableTransactionError, TransactionError, TransactionResult};
use ::sled::{Db, Transactional, Tree};
use async_trait::async_trait;
use tokio::sync::OwnedSemaphorePermit;

use super::{
    rank_modules, GraphSession, GraphStore, GraphWrite, GraphWriteBatch, ModuleEdges, ModuleMatch,
    ModuleQuery, SessionPool, StoreError, StoreResult,
};
use crate::model::{DependencyEdge, ModuleNode};

const SEPARATOR: u8 = 0;

fn pair_key(first: &str, second: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(first.len() + second.len() + 1);
    key.extend_from_slice(first.as_bytes());
    key.push(SEPARATOR);
    key.extend_from_slice(second.as_bytes());
    key
}

fn prefix(first: &str) -> Vec<u8> {
    let mut key = first.as_bytes().to_vec();
    key.push(SEPARATOR);
    key
}

#[derive(Clone)]
struct Trees {
    db: Db,
    modules: Tree,
    parts: Tree,
    memberships: Tree,
    dependencies: Tree,
    dependents: Tree,
}

impl Trees {
    fn open(db: Db) -> StoreResult<Self> {
        Ok(Self {
            modules: db.open_tree("modules")?,
            parts: db.open_tree("parts")?,
            memberships: db.open_tree("memberships")?,
            dependencies: db.open_tree("dependencies")?,
            dependents: db.open_tree("dependents")?,
            db,
        })
    }

    fn all(&self) -> [&Tree; 5] {
        [
            &self.modules,
            &self.parts,
            &self.memberships,
            &self.dependencies,
            &self.dependents,
        ]
    }
}

/// A write with its keys and values already encoded
enum EncodedWrite {
    Module { key: Vec<u8>, value: Vec<u8> },
    Part { key: Vec<u8>, value: Vec<u8> },
    Membership { module_id: String, part_key: Vec<u8>, key: Vec<u8> },
    Dependency { from: String, to: String, value: Vec<u8> },
}

impl EncodedWrite {
    fn encode(write: &GraphWrite) -> StoreResult<Self> {
        Ok(match write {
            GraphWrite::UpsertModule(node) => EncodedWrite::Module {
                key: node.module_id.as_bytes().to_vec(),
                value: serde_json::to_vec(node)?,
            },
            GraphWrite::UpsertPart(part) => EncodedWrite::Part {
                key: pair_key(&part.part_id, &part.module_id),
                value: serde_json::to_vec(part)?,
            },
            GraphWrite::LinkPart { module_id, part_id } => EncodedWrite::Membership {
                module_id: module_id.clone(),
                part_key: pair_key(part_id, module_id),
                key: pair_key(module_id, part_id),
            },
            GraphWrite::LinkDependency(edge) => EncodedWrite::Dependency {
                from: edge.from_module.clone(),
                to: edge.to_module.clone(),
                value: serde_json::to_vec(edge)?,
            },
        })
    }
}

/// Graph persisted in a sled database
pub struct SledGraphStore {
    trees: Trees,
    pool: SessionPool,
}

impl SledGraphStore {
    /// Open or create the database at `path`
    pub fn open(path: impl AsRef<Path>, max_sessions: usize) -> StoreResult<Self> {
        let db = ::sled::open(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), "Opened graph database");
        Self::from_db(db, max_sessions)
    }

    /// Database removed when the store is dropped
    pub fn temporary(max_sessions: usize) -> StoreResult<Self> {
        let db = ::sled::Config::new().temporary(true).open()?;
        Self::from_db(db, max_sessions)
    }

    fn from_db(db: Db, max_sessions: usize) -> StoreResult<Self> {
        Ok(Self {
            trees: Trees::open(db)?,
            pool: SessionPool::new(max_sessions),
        })
    }
}

#[async_trait]
impl GraphStore for SledGraphStore {
    fn name(&self) -> &str {
        "sled"
    }

    async fn session(&self) -> StoreResult<Box<dyn GraphSession>> {
        let permit = self.pool.acquire().await?;
        Ok(Box::new(SledSession {
            trees: self.trees.clone(),
            _permit: permit,
        }))
    }

    fn active_sessions(&self) -> usize {
        self.pool.in_use()
    }

    async fn close(&self) -> StoreResult<()> {
        self.pool.close();
        self.trees.db.flush_async().await?;
        Ok(())
    }
}

struct SledSession {
    trees: Trees,
    _permit: OwnedSemaphorePermit,
}

impl SledSession {
    fn modules(&self) -> impl Iterator<Item = StoreResult<ModuleNode>> + '_ {
        self.trees.modules.iter().values().map(|value| {
            let bytes = value?;
            Ok(serde_json::from_slice::<ModuleNode>(&bytes)?)
        })
    }

    fn edges_with_prefix(tree: &Tree, module_id: &str) -> StoreResult<Vec<DependencyEdge>> {
        tree.scan_prefix(prefix(module_id))
            .values()
            .map(|value| {
                let bytes = value?;
                Ok(serde_json::from_slice::<DependencyEdge>(&bytes)?)
            })
            .collect()
    }
}

#[async_trait]
impl GraphSession for SledSession {
    async fn clear_all(&mut self) -> StoreResult<()> {
        for tree in self.trees.all() {
            tree.clear()?;
        }
        self.trees.db.flush_async().await?;
        Ok(())
    }

    async fn commit(&mut self, batch: GraphWriteBatch) -> StoreResult<()> {
        let encoded = batch
            .writes()
            .iter()
            .map(EncodedWrite::encode)
            .collect::<StoreResult<Vec<_>>>()?;

        let trees = &self.trees;
        let outcome: TransactionResult<(), String> = (
            &trees.modules,
            &trees.parts,
            &trees.memberships,
            &trees.dependencies,
            &trees.dependents,
        )
            .transaction(|(modules, parts, memberships, dependencies, dependents)| {
                for write in &encoded {
                    match write {
                        EncodedWrite::Module { key, value } => {
                            modules.insert(key.as_slice(), value.as_slice())?;
                        }
                        EncodedWrite::Part { key, value } => {
                            parts.insert(key.as_slice(), value.as_slice())?;
                        }
                        EncodedWrite::Membership {
                            module_id,
                            part_key,
                            key,
                        } => {
                            if modules.get(module_id.as_bytes())?.is_none() {
                                return Err(ConflictableTransactionError::Abort(format!(
                                    "module '{}' does not exist",
                                    module_id
                                )));
                            }
                            if parts.get(part_key.as_slice())?.is_none() {
                                return Err(ConflictableTransactionError::Abort(format!(
                                    "part of module '{}' does not exist",
                                    module_id
                                )));
                            }
                            memberships.insert(key.as_slice(), Vec::<u8>::new())?;
                        }
                        EncodedWrite::Dependency { from, to, value } => {
                            for endpoint in [from, to] {
                                if modules.get(endpoint.as_bytes())?.is_none() {
                                    return Err(ConflictableTransactionError::Abort(format!(
                                        "module '{}' does not exist",
                                        endpoint
                                    )));
                                }
                            }
                            dependencies.insert(pair_key(from, to), value.as_slice())?;
                            dependents.insert(pair_key(to, from), value.as_slice())?;
                        }
                    }
                }
                Ok(())
            });

        match outcome {
            Ok(()) => {}
            Err(TransactionError::Abort(reason)) => return Err(StoreError::Transaction(reason)),
            Err(TransactionError::Storage(err)) => return Err(err.into()),
        }

        self.trees.db.flush_async().await?;
        Ok(())
    }

    async fn stored_hashes(&mut self) -> StoreResult<HashMap<String, String>> {
        self.modules()
            .map(|node| node.map(|n| (n.module_id, n.contract_file_hash)))
            .collect()
    }

    async fn module_exists(&mut self, module_id: &str) -> StoreResult<bool> {
        Ok(self.trees.modules.contains_key(module_id.as_bytes())?)
    }

    async fn dependency_edges(&mut self, module_id: &str) -> StoreResult<ModuleEdges> {
        Ok(ModuleEdges {
            outgoing: Self::edges_with_prefix(&self.trees.dependencies, module_id)?,
            incoming: Self::edges_with_prefix(&self.trees.dependents, module_id)?,
        })
    }

    async fn find_modules(&mut self, query: &ModuleQuery) -> StoreResult<Vec<ModuleMatch>> {
        let nodes = self.modules().collect::<StoreResult<Vec<_>>>()?;
        Ok(rank_modules(nodes, query))
    }

    async fn module_count(&mut self) -> StoreResult<usize> {
        Ok(self.trees.modules.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DependencyPart, PartNode};

    fn module(id: &str, hash: &str) -> ModuleNode {
        ModuleNode {
            module_id: id.to_string(),
            module_type: "library".to_string(),
            category: "backend".to_string(),
            description: format!("{} library", id),
            contract_file_hash: hash.to_string(),
            embedding: Some(vec![1.0, 0.0]),
        }
    }

    fn graph_batch() -> GraphWriteBatch {
        let mut batch = GraphWriteBatch::new();
        batch.push(GraphWrite::UpsertModule(module("api", "h1")));
        batch.push(GraphWrite::UpsertModule(module("db", "h2")));
        batch.push(GraphWrite::UpsertPart(PartNode {
            part_id: "query".to_string(),
            module_id: "db".to_string(),
            part_type: "function".to_string(),
        }));
        batch.push(GraphWrite::LinkPart {
            module_id: "db".to_string(),
            part_id: "query".to_string(),
        });
        batch.push(GraphWrite::LinkDependency(
            DependencyEdge::new("api", "db", &[DependencyPart::new("query", "function")]).unwrap(),
        ));
        batch
    }

    #[tokio::test]
    async fn test_commit_and_read_edges() {
        let store = SledGraphStore::temporary(2).unwrap();
        let mut session = store.session().await.unwrap();
        session.commit(graph_batch()).await.unwrap();

        assert_eq!(session.module_count().await.unwrap(), 2);
        let edges = session.dependency_edges("api").await.unwrap();
        assert_eq!(edges.outgoing.len(), 1);
        assert_eq!(edges.outgoing[0].to_module, "db");
        assert_eq!(edges.outgoing[0].parts().unwrap()[0].part_id, "query");
        assert!(edges.incoming.is_empty());

        let incoming = session.dependency_edges("db").await.unwrap().incoming;
        assert_eq!(incoming[0].from_module, "api");
    }

    #[tokio::test]
    async fn test_prefix_does_not_leak_between_ids() {
        let store = SledGraphStore::temporary(1).unwrap();
        let mut session = store.session().await.unwrap();
        let mut batch = GraphWriteBatch::new();
        for id in ["a", "ab", "b"] {
            batch.push(GraphWrite::UpsertModule(module(id, "h")));
        }
        batch.push(GraphWrite::LinkDependency(DependencyEdge::new("ab", "b", &[]).unwrap()));
        session.commit(batch).await.unwrap();

        let edges = session.dependency_edges("a").await.unwrap();
        assert!(edges.outgoing.is_empty());
    }

    #[tokio::test]
    async fn test_aborted_commit_writes_nothing() {
        let store = SledGraphStore::temporary(1).unwrap();
        let mut session = store.session().await.unwrap();

        let mut batch = GraphWriteBatch::new();
        batch.push(GraphWrite::UpsertModule(module("lonely", "h")));
        batch.push(GraphWrite::LinkDependency(
            DependencyEdge::new("lonely", "ghost", &[]).unwrap(),
        ));
        let err = session.commit(batch).await.unwrap_err();
        assert!(matches!(err, StoreError::Transaction(_)));
        assert!(!session.module_exists("lonely").await.unwrap());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph");
        {
            let store = SledGraphStore::open(&path, 1).unwrap();
            let mut session = store.session().await.unwrap();
            session.commit(graph_batch()).await.unwrap();
            drop(session);
            store.close().await.unwrap();
        }

        let store = SledGraphStore::open(&path, 1).unwrap();
        let mut session = store.session().await.unwrap();
        let hashes = session.stored_hashes().await.unwrap();
        assert_eq!(hashes.len(), 2);
        assert_eq!(hashes["db"], "h2");
    }

    #[tokio::test]
    async fn test_clear_all_empties_every_tree() {
        let store = SledGraphStore::temporary(1).unwrap();
        let mut session = store.session().await.unwrap();
        session.commit(graph_batch()).await.unwrap();
        session.clear_all().await.unwrap();

        assert_eq!(session.module_count().await.unwrap(), 0);
        assert!(session.dependency_edges("db").await.unwrap().incoming.is_empty());
        let found = session
            .find_modules(&ModuleQuery {
                embedding: None,
                module_type: None,
                category: None,
                module_ids: None,
                limit: 10,
            })
            .await
            .unwrap();
        assert!(found.is_empty());
    }
}
