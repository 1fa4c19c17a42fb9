//! Similarity search over module nodes
//!
//! A request with query text is a semantic search: the text is embedded and
//! modules are ranked by similarity. A request without query text but with a
//! `module_type` and/or `category` filter is a filter-only search. Results are
//! joined back onto the current source records so callers always get the
//! full, current record content.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::source::{SourceError, SourceRecord};
use crate::store::{GraphSession, ModuleQuery, StoreError};

/// Default number of results
pub const DEFAULT_LIMIT: usize = 10;

/// Largest accepted result limit
pub const MAX_LIMIT: usize = 100;

/// Search errors
#[derive(Error, Debug)]
pub enum SearchError {
    /// Query text given while the embedding provider is not ready
    #[error("Semantic search unavailable: embedding provider is not ready")]
    ProviderNotReady,

    #[error("Invalid search request: {0}")]
    InvalidRequest(String),

    #[error("Failed to embed query: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Search parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: Option<String>,
    pub module_type: Option<String>,
    pub category: Option<String>,
    pub limit: Option<usize>,
}

impl SearchRequest {
    pub fn semantic(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Self::default()
        }
    }

    pub fn filter() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, module_type: impl Into<String>) -> Self {
        self.module_type = Some(module_type.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Query text with surrounding whitespace removed; blank counts as absent
    pub fn query_text(&self) -> Option<&str> {
        self.query.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }

    pub fn is_semantic(&self) -> bool {
        self.query_text().is_some()
    }

    /// Check the request and resolve its limit
    pub fn validate(&self, default_limit: usize) -> Result<usize, SearchError> {
        let limit = self.limit.unwrap_or(default_limit);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(SearchError::InvalidRequest(format!(
                "limit must be between 1 and {}, got {}",
                MAX_LIMIT, limit
            )));
        }
        if !self.is_semantic() && self.module_type.is_none() && self.category.is_none() {
            return Err(SearchError::InvalidRequest(
                "provide query text or at least one of type/category".to_string(),
            ));
        }
        Ok(limit)
    }
}

/// One search hit with its record content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub file_name: String,
    pub file_path: String,
    pub content: serde_json::Value,
    pub file_hash: String,
    pub similarity: f32,
}

/// Search response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub query: Option<String>,
    pub results_count: usize,
    pub results: Vec<SearchHit>,
}

/// Run a search request
///
/// In semantic mode the provider must be ready; otherwise this fails with
/// [`SearchError::ProviderNotReady`] before touching the store.
pub async fn search(
    session: &mut dyn GraphSession,
    embeddings: &dyn EmbeddingProvider,
    records: &[SourceRecord],
    request: &SearchRequest,
    default_limit: usize,
) -> Result<SearchResult, SearchError> {
    let limit = request.validate(default_limit)?;

    let embedding = match request.query_text() {
        Some(text) => {
            if !embeddings.is_ready() {
                return Err(SearchError::ProviderNotReady);
            }
            Some(embeddings.generate_embedding(text).await?)
        }
        None => None,
    };

    let by_id: HashMap<&str, &SourceRecord> = records
        .iter()
        .filter_map(|record| record.module_id().map(|id| (id, record)))
        .collect();

    let query = ModuleQuery {
        embedding,
        module_type: request.module_type.clone(),
        category: request.category.clone(),
        module_ids: Some(by_id.keys().map(|id| id.to_string()).collect()),
        limit,
    };
    let matches = session.find_modules(&query).await?;

    let results: Vec<SearchHit> = matches
        .into_iter()
        .filter_map(|hit| {
            let Some(record) = by_id.get(hit.module_id.as_str()) else {
                tracing::debug!(module_id = %hit.module_id, "Search hit has no current record, skipping");
                return None;
            };
            let content = record.parsed.as_ref().ok()?.clone();
            Some(SearchHit {
                file_name: record.filename.clone(),
                file_path: record.path.clone(),
                content,
                file_hash: record.content_hash.clone(),
                similarity: hit.similarity,
            })
        })
        .collect();

    tracing::debug!(
        semantic = request.is_semantic(),
        results = results.len(),
        "Search completed"
    );

    Ok(SearchResult {
        query: request.query.clone(),
        results_count: results.len(),
        results,
    })
}
