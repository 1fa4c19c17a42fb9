//! Graph synchronization
//!
//! An apply replaces the whole graph with the contents of a validated batch:
//!
//! 1. destroy all graph content (its own step, not part of the transaction
//!    below, so a failure after it leaves the graph empty);
//! 2. write every module node, with an embedding of its description when
//!    the provider is ready;
//! 3. write every part node and its membership edge;
//! 4. write one dependency edge per declared dependency, carrying the used
//!    parts as an opaque blob.
//!
//! Steps 2-4 are committed as a single write batch. Failures never escape as
//! errors: they come back as an [`ApplyResult`] with `success: false`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::embedding::{EmbeddingProvider, Readiness};
use crate::model::{DependencyEdge, ModuleNode, PartNode};
use crate::store::{GraphSession, GraphWrite, GraphWriteBatch, StoreResult};
use crate::telemetry::EngineMetrics;
use crate::validation::ValidatedBatch;

/// Outcome of an apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResult {
    pub success: bool,
    pub modules_processed: usize,
    pub parts_processed: usize,
    pub message: String,
}

impl ApplyResult {
    pub fn succeeded(modules: usize, parts: usize) -> Self {
        Self {
            success: true,
            modules_processed: modules,
            parts_processed: parts,
            message: format!(
                "Applied {} modules and {} parts to the graph",
                modules, parts
            ),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            modules_processed: 0,
            parts_processed: 0,
            message: message.into(),
        }
    }
}

/// Writes validated batches into a graph store
pub struct GraphSynchronizer {
    embeddings: Arc<dyn EmbeddingProvider>,
    metrics: Option<Arc<EngineMetrics>>,
    apply_lock: Mutex<()>,
}

impl GraphSynchronizer {
    pub fn new(embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embeddings,
            metrics: None,
            apply_lock: Mutex::new(()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Replace the graph behind `session` with `batch`
    ///
    /// Applies through the same synchronizer run one at a time.
    pub async fn apply(&self, session: &mut dyn GraphSession, batch: &ValidatedBatch) -> ApplyResult {
        let _guard = self.apply_lock.lock().await;

        match self.rebuild(session, batch).await {
            Ok((modules, parts)) => {
                tracing::info!(modules = modules, parts = parts, "Graph rebuilt");
                ApplyResult::succeeded(modules, parts)
            }
            Err(e) => {
                tracing::error!(error = %e, "Graph apply failed");
                ApplyResult::failed(format!("Failed to apply contracts: {}", e))
            }
        }
    }

    async fn rebuild(
        &self,
        session: &mut dyn GraphSession,
        batch: &ValidatedBatch,
    ) -> StoreResult<(usize, usize)> {
        session.clear_all().await?;
        tracing::debug!("Cleared existing graph");

        let writes = self.build_writes(batch).await?;
        tracing::debug!(writes = writes.len(), "Committing graph writes");
        session.commit(writes).await?;

        let parts = batch.records().iter().map(|r| r.contract.part_count()).sum();
        Ok((batch.len(), parts))
    }

    /// Turn a batch into the write set for one commit
    pub async fn build_writes(&self, batch: &ValidatedBatch) -> StoreResult<GraphWriteBatch> {
        let mut writes = GraphWriteBatch::new();
        let embed = match self.embeddings.readiness() {
            Readiness::Ready => true,
            Readiness::NotReady => {
                tracing::debug!("Embedding provider not ready, storing modules without embeddings");
                false
            }
            Readiness::Failed(reason) => {
                tracing::warn!(reason = %reason, "Embedding provider unavailable, storing modules without embeddings");
                false
            }
        };

        for record in batch.records() {
            let contract = &record.contract;
            let embedding = if embed {
                self.embed_description(&contract.id, &contract.description).await
            } else {
                None
            };
            writes.push(GraphWrite::UpsertModule(
                ModuleNode::from_contract(contract, record.content_hash.clone()).with_embedding(embedding),
            ));
        }

        for record in batch.records() {
            let contract = &record.contract;
            for part in &contract.parts {
                writes.push(GraphWrite::UpsertPart(PartNode {
                    part_id: part.id.clone(),
                    module_id: contract.id.clone(),
                    part_type: part.part_type.clone(),
                }));
                writes.push(GraphWrite::LinkPart {
                    module_id: contract.id.clone(),
                    part_id: part.id.clone(),
                });
            }
        }

        for record in batch.records() {
            let contract = &record.contract;
            for dependency in &contract.dependencies {
                writes.push(GraphWrite::LinkDependency(DependencyEdge::new(
                    contract.id.clone(),
                    dependency.module_id.clone(),
                    &dependency.parts,
                )?));
            }
        }

        Ok(writes)
    }

    async fn embed_description(&self, module_id: &str, description: &str) -> Option<Vec<f32>> {
        match self.embeddings.generate_embedding(description).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                tracing::warn!(module_id = %module_id, error = %e, "Embedding failed, storing module without one");
                if let Some(metrics) = &self.metrics {
                    metrics.record_embedding_failure();
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{DisabledEmbeddings, EmbeddingError, EmbeddingResult};
    use crate::source::SourceRecord;
    use crate::store::{GraphStore, MemoryGraphStore};
    use crate::validation::validate_batch;
    use async_trait::async_trait;
    use mockall::mock;

    mock! {
        pub Embedder {}

        #[async_trait]
        impl EmbeddingProvider for Embedder {
            fn name(&self) -> &str;
            fn readiness(&self) -> Readiness;
            async fn generate_embedding(&self, text: &str) -> EmbeddingResult<Vec<f32>>;
        }
    }

    fn batch(raw: &[(&str, &str)]) -> ValidatedBatch {
        let records: Vec<_> = raw
            .iter()
            .map(|(name, body)| SourceRecord::parse(*name, format!("contracts/{}", name), *body))
            .collect();
        validate_batch(&records).into_validated().unwrap()
    }

    fn two_modules() -> ValidatedBatch {
        batch(&[
            (
                "ledger.json",
                r#"{"id":"ledger","type":"service","category":"backend","description":"Ledger",
                    "parts":[{"id":"post","type":"function"},{"id":"Entry","type":"class"}]}"#,
            ),
            (
                "billing.json",
                r#"{"id":"billing","type":"service","category":"backend","description":"Billing",
                    "dependencies":[{"module_id":"ledger","parts":[{"part_id":"post","type":"function"}]}]}"#,
            ),
        ])
    }

    #[tokio::test]
    async fn test_apply_writes_graph() {
        let store = MemoryGraphStore::new();
        let sync = GraphSynchronizer::new(Arc::new(DisabledEmbeddings));
        let mut session = store.session().await.unwrap();

        let result = sync.apply(session.as_mut(), &two_modules()).await;
        assert!(result.success, "{}", result.message);
        assert_eq!(result.modules_processed, 2);
        assert_eq!(result.parts_processed, 2);

        assert_eq!(store.part_count().await, 2);
        assert_eq!(store.dependency_count().await, 1);
        assert!(store.module("ledger").await.unwrap().embedding.is_none());
    }

    #[tokio::test]
    async fn test_embeddings_attached_when_ready() {
        let mut embedder = MockEmbedder::new();
        embedder.expect_readiness().returning(|| Readiness::Ready);
        embedder
            .expect_generate_embedding()
            .times(2)
            .returning(|_| Ok(vec![1.0, 0.0]));

        let store = MemoryGraphStore::new();
        let sync = GraphSynchronizer::new(Arc::new(embedder));
        let mut session = store.session().await.unwrap();
        assert!(sync.apply(session.as_mut(), &two_modules()).await.success);

        let node = store.module("billing").await.unwrap();
        assert_eq!(node.embedding, Some(vec![1.0, 0.0]));
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades_to_none() {
        let mut embedder = MockEmbedder::new();
        embedder.expect_readiness().returning(|| Readiness::Ready);
        embedder
            .expect_generate_embedding()
            .withf(|text| text == "Ledger")
            .returning(|_| Err(EmbeddingError::Http("connection reset".to_string())));
        embedder
            .expect_generate_embedding()
            .withf(|text| text == "Billing")
            .returning(|_| Ok(vec![0.0, 1.0]));

        let store = MemoryGraphStore::new();
        let sync = GraphSynchronizer::new(Arc::new(embedder));
        let mut session = store.session().await.unwrap();
        let result = sync.apply(session.as_mut(), &two_modules()).await;

        assert!(result.success);
        assert!(store.module("ledger").await.unwrap().embedding.is_none());
        assert!(store.module("billing").await.unwrap().embedding.is_some());
    }

    #[tokio::test]
    async fn test_failed_provider_is_not_called() {
        let mut embedder = MockEmbedder::new();
        embedder
            .expect_readiness()
            .returning(|| Readiness::Failed("unreachable".to_string()));
        embedder.expect_generate_embedding().never();

        let store = MemoryGraphStore::new();
        let sync = GraphSynchronizer::new(Arc::new(embedder));
        let mut session = store.session().await.unwrap();
        assert!(sync.apply(session.as_mut(), &two_modules()).await.success);
    }

    #[tokio::test]
    async fn test_reapply_replaces_previous_graph() {
        let store = MemoryGraphStore::new();
        let sync = GraphSynchronizer::new(Arc::new(DisabledEmbeddings));
        let mut session = store.session().await.unwrap();
        sync.apply(session.as_mut(), &two_modules()).await;

        let smaller = batch(&[(
            "solo.json",
            r#"{"id":"solo","type":"library","category":"shared","description":"Solo"}"#,
        )]);
        let result = sync.apply(session.as_mut(), &smaller).await;
        assert_eq!(result.modules_processed, 1);
        assert!(store.module("ledger").await.is_none());
        assert_eq!(store.part_count().await, 0);
        assert_eq!(store.dependency_count().await, 0);
    }

    #[test]
    fn test_apply_result_shape() {
        let json = serde_json::to_value(ApplyResult::succeeded(1, 0)).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["modulesProcessed"], 1);
        assert_eq!(json["partsProcessed"], 0);
        assert!(json["message"].is_string());
    }
}
