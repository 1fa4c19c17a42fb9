//! Contract graph engine
//!
//! [`ContractGraph`] ties a record source, a graph store and an embedding
//! provider together and exposes the engine operations. Every operation loads
//! a fresh record batch and, when it needs the graph, opens exactly one store
//! session that is released when the operation returns.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::changes::{detect_changes, ChangeCheckResult, CurrentModuleHash};
use crate::config::EngineConfig;
use crate::embedding::{DisabledEmbeddings, EmbeddingProvider, HttpEmbeddingProvider, Readiness};
use crate::error::{EngineError, Result};
use crate::model::{DependencyEdge, DependencyPart};
use crate::search::{self, SearchError, SearchRequest, SearchResult};
use crate::source::{DirectoryRecordSource, RecordSource, SourceRecord};
use crate::store::{GraphSession, GraphStore, SledGraphStore, StoreError};
use crate::sync::{ApplyResult, GraphSynchronizer};
use crate::telemetry::EngineMetrics;
use crate::validation::{validate_batch, BatchValidation, ValidationResult};

/// A module on the other end of a dependency edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedModule {
    pub module_id: String,
    /// Parts used across the edge, in declaration order
    pub parts: Vec<DependencyPart>,
}

/// Dependency neighbourhood of one module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRelations {
    pub module_id: String,
    /// Modules this module depends on
    pub outgoing_dependencies: Vec<RelatedModule>,
    /// Modules depending on this module
    pub incoming_dependencies: Vec<RelatedModule>,
}

/// Engine health snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub source: String,
    pub store: String,
    pub stored_modules: usize,
    pub embeddings: String,
    pub embeddings_ready: bool,
}

/// The contract validation and graph synchronization engine
pub struct ContractGraph {
    source: Arc<dyn RecordSource>,
    store: Arc<dyn GraphStore>,
    embeddings: Arc<dyn EmbeddingProvider>,
    synchronizer: GraphSynchronizer,
    metrics: Option<Arc<EngineMetrics>>,
    search_default_limit: usize,
    warmup: Mutex<Option<JoinHandle<Readiness>>>,
}

impl ContractGraph {
    pub fn new(
        source: Arc<dyn RecordSource>,
        store: Arc<dyn GraphStore>,
        embeddings: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            synchronizer: GraphSynchronizer::new(Arc::clone(&embeddings)),
            source,
            store,
            embeddings,
            metrics: None,
            search_default_limit: search::DEFAULT_LIMIT,
            warmup: Mutex::new(None),
        }
    }

    /// Build an engine from configuration
    ///
    /// Opens the sled graph at `config.graph_path` and, when an embedding
    /// endpoint is configured, starts warming up the HTTP provider in the
    /// background. Must be called from within a tokio runtime.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        config.validate()?;

        let source = DirectoryRecordSource::new(config.contracts_dir.clone())
            .with_extensions(config.file_extensions.iter().cloned());
        let store = SledGraphStore::open(&config.graph_path, config.max_sessions)?;

        let (embeddings, warmup) = match &config.embedding.endpoint {
            Some(endpoint) => {
                tracing::info!(endpoint = %endpoint, "Starting embedding provider");
                let provider = Arc::new(HttpEmbeddingProvider::new(config.embedding.clone())?);
                let handle = provider.start();
                (provider as Arc<dyn EmbeddingProvider>, Some(handle))
            }
            None => (Arc::new(DisabledEmbeddings) as Arc<dyn EmbeddingProvider>, None),
        };

        let mut engine = Self::new(Arc::new(source), Arc::new(store), embeddings)
            .with_search_default_limit(config.search_default_limit);
        engine.warmup = Mutex::new(warmup);
        Ok(engine)
    }

    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.synchronizer = GraphSynchronizer::new(Arc::clone(&self.embeddings))
            .with_metrics(Arc::clone(&metrics));
        self.metrics = Some(metrics);
        self
    }

    pub fn with_search_default_limit(mut self, limit: usize) -> Self {
        self.search_default_limit = limit;
        self
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn embeddings(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embeddings
    }

    /// Wait for a background embedding warm-up, if one was started
    pub async fn await_embeddings(&self) -> Readiness {
        let handle = self.warmup.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Embedding warm-up task did not finish");
            }
        }
        self.embeddings.readiness()
    }

    /// Validate the current record batch
    pub async fn validate(&self) -> Result<ValidationResult> {
        let span = tracing::info_span!("validate", operation_id = %Uuid::new_v4());
        self.run_validate().instrument(span).await
    }

    async fn run_validate(&self) -> Result<ValidationResult> {
        let records = self.load_records()?;
        Ok(self.validate_records(&records).result)
    }

    /// Validate the current batch and, if valid, rebuild the graph from it
    ///
    /// An invalid batch or a failed rebuild yields `success: false`; only a
    /// missing record source is an error.
    pub async fn apply(&self) -> Result<ApplyResult> {
        let span = tracing::info_span!("apply", operation_id = %Uuid::new_v4());
        self.run_apply().instrument(span).await
    }

    async fn run_apply(&self) -> Result<ApplyResult> {
        let records = self.load_records()?;
        let total = records.len();
        let validation = self.validate_records(&records);

        let batch = match validation.into_validated() {
            Ok(batch) => batch,
            Err(report) => {
                tracing::warn!(invalid = report.invalid_count(), "Refusing to apply invalid batch");
                self.record_apply(false, 0);
                return Ok(ApplyResult::failed(format!(
                    "Validation failed: {} of {} files have errors",
                    report.invalid_count(),
                    total
                )));
            }
        };

        let _timer = self.metrics.as_ref().map(|m| m.start_apply_timer());
        let result = match self.session().await {
            Ok(mut session) => self.synchronizer.apply(session.as_mut(), &batch).await,
            Err(e) => ApplyResult::failed(format!("Failed to apply contracts: {}", e)),
        };
        self.update_session_gauge();

        self.record_apply(result.success, result.modules_processed);
        tracing::info!(
            success = result.success,
            modules = result.modules_processed,
            parts = result.parts_processed,
            "Apply finished"
        );
        Ok(result)
    }

    /// Compare the current batch against the hashes stored by the last apply
    pub async fn check_modified(&self) -> Result<ChangeCheckResult> {
        let span = tracing::info_span!("check_modified", operation_id = %Uuid::new_v4());
        self.run_check_modified().instrument(span).await
    }

    async fn run_check_modified(&self) -> Result<ChangeCheckResult> {
        let records = self.load_records()?;
        let current = CurrentModuleHash::from_records(&records);

        let stored = {
            let mut session = self.session().await?;
            session.stored_hashes().await
        };
        self.update_session_gauge();
        let result = detect_changes(&current, &stored?);

        if let Some(metrics) = &self.metrics {
            metrics.record_change_check(result.has_changes);
        }
        tracing::info!(
            total = result.total_changes,
            added = result.added_count,
            modified = result.modified_count,
            removed = result.removed_count,
            "Change check finished"
        );
        Ok(result)
    }

    /// Dependencies of a module in both directions
    pub async fn relations(&self, module_id: &str) -> Result<ModuleRelations> {
        let span = tracing::info_span!("relations", operation_id = %Uuid::new_v4(), module_id = %module_id);
        self.run_relations(module_id.trim()).instrument(span).await
    }

    async fn run_relations(&self, module_id: &str) -> Result<ModuleRelations> {
        if module_id.is_empty() {
            return Err(EngineError::invalid_input("module id must not be empty"));
        }

        let outcome = {
            let mut session = self.session().await?;
            Self::load_relations(session.as_mut(), module_id).await
        };
        self.update_session_gauge();
        outcome
    }

    async fn load_relations(session: &mut dyn GraphSession, module_id: &str) -> Result<ModuleRelations> {
        if !session.module_exists(module_id).await? {
            return Err(EngineError::not_found(module_id));
        }
        let edges = session.dependency_edges(module_id).await?;

        let mut outgoing = edges
            .outgoing
            .iter()
            .map(|edge| related(edge, &edge.to_module))
            .collect::<Result<Vec<_>>>()?;
        let mut incoming = edges
            .incoming
            .iter()
            .map(|edge| related(edge, &edge.from_module))
            .collect::<Result<Vec<_>>>()?;
        outgoing.sort_by(|a, b| a.module_id.cmp(&b.module_id));
        incoming.sort_by(|a, b| a.module_id.cmp(&b.module_id));

        Ok(ModuleRelations {
            module_id: module_id.to_string(),
            outgoing_dependencies: outgoing,
            incoming_dependencies: incoming,
        })
    }

    /// Semantic or filter-only module search
    ///
    /// A semantic search against a provider that is not ready fails before
    /// any record is loaded or session opened.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResult> {
        let span = tracing::info_span!("search", operation_id = %Uuid::new_v4());
        self.run_search(request).instrument(span).await
    }

    async fn run_search(&self, request: &SearchRequest) -> Result<SearchResult> {
        request.validate(self.search_default_limit)?;
        if request.is_semantic() && !self.embeddings.is_ready() {
            return Err(SearchError::ProviderNotReady.into());
        }
        let mode = if request.is_semantic() { "semantic" } else { "filter" };
        if let Some(metrics) = &self.metrics {
            metrics.record_search(mode);
        }

        let records = self.load_records()?;
        let outcome = {
            let mut session = self.session().await?;
            search::search(
                session.as_mut(),
                self.embeddings.as_ref(),
                &records,
                request,
                self.search_default_limit,
            )
            .await
        };
        self.update_session_gauge();

        let result = outcome?;
        tracing::info!(mode = mode, results = result.results_count, "Search finished");
        Ok(result)
    }

    /// Store size and embedding readiness
    pub async fn status(&self) -> Result<EngineStatus> {
        let stored_modules = {
            let mut session = self.session().await?;
            session.module_count().await
        };
        self.update_session_gauge();

        let readiness = self.embeddings.readiness();
        let embeddings = match &readiness {
            Readiness::Ready => format!("{}: ready", self.embeddings.name()),
            Readiness::NotReady => format!("{}: not ready", self.embeddings.name()),
            Readiness::Failed(reason) => format!("{}: failed ({})", self.embeddings.name(), reason),
        };

        Ok(EngineStatus {
            source: self.source.name().to_string(),
            store: self.store.name().to_string(),
            stored_modules: stored_modules?,
            embeddings,
            embeddings_ready: readiness.is_ready(),
        })
    }

    /// Release the store; later operations fail
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!(store = self.store.name(), "Shutting down contract graph");
        self.store.close().await?;
        Ok(())
    }

    fn load_records(&self) -> Result<Vec<SourceRecord>> {
        let records = self.source.load()?;
        tracing::debug!(source = self.source.name(), records = records.len(), "Loaded records");
        Ok(records)
    }

    fn validate_records(&self, records: &[SourceRecord]) -> BatchValidation {
        let validation = validate_batch(records);
        let result = &validation.result;
        if let Some(metrics) = &self.metrics {
            metrics.record_validation(result.valid, result.issue_count());
        }
        tracing::info!(
            files = result.files.len(),
            invalid = result.invalid_count(),
            valid = result.valid,
            "Validation finished"
        );
        validation
    }

    async fn session(&self) -> Result<Box<dyn GraphSession>> {
        let session = self.store.session().await?;
        self.update_session_gauge();
        Ok(session)
    }

    fn update_session_gauge(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.set_active_sessions(self.store.active_sessions());
        }
    }

    fn record_apply(&self, success: bool, modules: usize) {
        if let Some(metrics) = &self.metrics {
            metrics.record_apply(success, modules);
        }
    }
}

fn related(edge: &DependencyEdge, peer: &str) -> Result<RelatedModule> {
    Ok(RelatedModule {
        module_id: peer.to_string(),
        parts: edge.parts().map_err(StoreError::from)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryRecordSource;
    use crate::store::MemoryGraphStore;

    fn engine_with(source: MemoryRecordSource) -> (ContractGraph, Arc<MemoryGraphStore>) {
        let store = Arc::new(MemoryGraphStore::new());
        let engine = ContractGraph::new(
            Arc::new(source),
            store.clone(),
            Arc::new(DisabledEmbeddings),
        );
        (engine, store)
    }

    fn web_of_modules() -> MemoryRecordSource {
        MemoryRecordSource::new()
            .with_record(
                "db.yaml",
                "id: db\ntype: library\ncategory: backend\ndescription: Storage\nparts:\n  - id: query\n    type: function\n",
            )
            .with_record(
                "api.yaml",
                "id: api\ntype: service\ncategory: backend\ndescription: API\ndependencies:\n  - module_id: db\n    parts:\n      - part_id: query\n        type: function\n",
            )
            .with_record(
                "web.yaml",
                "id: web\ntype: app\ncategory: frontend\ndescription: Web\ndependencies:\n  - module_id: api\n    parts: []\n",
            )
    }

    #[tokio::test]
    async fn test_invalid_batch_is_not_applied() {
        let (engine, store) = engine_with(web_of_modules());
        let result = engine.apply().await.unwrap();
        assert!(!result.success);
        assert!(result.message.contains("1 of 3"));
        assert_eq!(store.query_count(), 0);
    }

    #[tokio::test]
    async fn test_relations_in_both_directions() {
        let source = web_of_modules();
        source.set_record(
            "web.yaml",
            "id: web\ntype: app\ncategory: frontend\ndescription: Web\n",
        );
        let (engine, _store) = engine_with(source);
        assert!(engine.apply().await.unwrap().success);

        let relations = engine.relations("db").await.unwrap();
        assert!(relations.outgoing_dependencies.is_empty());
        assert_eq!(relations.incoming_dependencies.len(), 1);
        assert_eq!(relations.incoming_dependencies[0].module_id, "api");
        assert_eq!(relations.incoming_dependencies[0].parts[0].part_id, "query");

        let api = engine.relations("api").await.unwrap();
        assert_eq!(api.outgoing_dependencies[0].module_id, "db");
    }

    #[tokio::test]
    async fn test_relations_unknown_module() {
        let (engine, store) = engine_with(MemoryRecordSource::new());
        let err = engine.relations("nope").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.active_sessions(), 0);

        assert!(matches!(
            engine.relations("  ").await,
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_status_reports_store_and_embeddings() {
        let (engine, _store) = engine_with(MemoryRecordSource::new());
        let status = engine.status().await.unwrap();
        assert_eq!(status.store, "memory");
        assert_eq!(status.stored_modules, 0);
        assert!(!status.embeddings_ready);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_later_operations() {
        let (engine, _store) = engine_with(MemoryRecordSource::new());
        engine.shutdown().await.unwrap();
        let err = engine.check_modified().await.unwrap_err();
        assert!(matches!(err, EngineError::Store(_)));
    }
}
