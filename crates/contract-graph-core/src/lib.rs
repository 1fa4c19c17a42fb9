//! Contract Graph
//!
//! Validation, change detection and graph synchronization for declarative
//! module contracts, with embedding-based similarity search.
//!
//! ## Features
//!
//! - **Structural Validation**: Check each contract's shape in isolation
//! - **Referential Validation**: Check contracts against each other (unique
//!   ids, dependency targets, used parts and their types)
//! - **Change Detection**: SHA-256 content hashes compared with the last
//!   applied state
//! - **Graph Synchronization**: Reset-and-rebuild of a module/part graph from
//!   a validated batch
//! - **Similarity Search**: Semantic ranking over description embeddings, or
//!   exact type/category filtering
//! - **Telemetry**: Prometheus metrics and `tracing` spans per operation
//!
//! ## Architecture
//!
//! 1. **Source** (`source/`): loads the complete record batch (JSON, YAML or
//!    TOML) and performs the first parsing stage.
//!
//! 2. **Validation** (`validation/`): structural then referential checks;
//!    only a valid batch becomes a `ValidatedBatch`.
//!
//! 3. **Store** (`store/`): pooled sessions over an in-memory or sled graph.
//!
//! 4. **Sync** (`sync`): writes a `ValidatedBatch` into the graph.
//!
//! 5. **Search** (`search`) and **Embedding** (`embedding/`): optional
//!    semantic search, degrading to filter-only when no provider is ready.
//!
//! 6. **Engine** (`engine`): the `ContractGraph` facade.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use contract_graph_core::{
//!     ContractGraph, DisabledEmbeddings, MemoryGraphStore, MemoryRecordSource, SearchRequest,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let source = MemoryRecordSource::new().with_record(
//!         "billing.yaml",
//!         "id: billing\ntype: service\ncategory: backend\ndescription: Billing\n",
//!     );
//!     let engine = ContractGraph::new(
//!         Arc::new(source),
//!         Arc::new(MemoryGraphStore::new()),
//!         Arc::new(DisabledEmbeddings),
//!     );
//!
//!     let applied = engine.apply().await.unwrap();
//!     assert!(applied.success);
//!
//!     let found = engine
//!         .search(&SearchRequest::filter().with_category("backend"))
//!         .await
//!         .unwrap();
//!     println!("{} modules", found.results_count);
//! }
//! ```

pub mod changes;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod hashing;
pub mod model;
pub mod search;
pub mod source;
pub mod store;
pub mod sync;
pub mod telemetry;
pub mod validation;

pub use changes::{detect_changes, ChangeCheckResult, ChangeStatus, ModuleChange};
pub use config::{ConfigError, EmbeddingConfig, EngineConfig};
pub use embedding::{DisabledEmbeddings, EmbeddingError, EmbeddingProvider, HttpEmbeddingProvider, Readiness};
pub use engine::{ContractGraph, EngineStatus, ModuleRelations, RelatedModule};
pub use error::{EngineError, Result};
pub use hashing::content_hash;
pub use model::{Contract, Dependency, DependencyPart, Part};
pub use search::{SearchError, SearchHit, SearchRequest, SearchResult};
pub use source::{DirectoryRecordSource, MemoryRecordSource, RecordSource, SourceError, SourceRecord};
pub use store::{GraphSession, GraphStore, MemoryGraphStore, SledGraphStore, StoreError};
pub use sync::{ApplyResult, GraphSynchronizer};
pub use telemetry::{EngineMetrics, MetricsRegistry};
pub use validation::{validate_batch, FileValidation, ValidatedBatch, ValidationIssue, ValidationResult};
