//! Error types for the contract graph engine

use thiserror::Error;

use crate::config::ConfigError;
use crate::embedding::EmbeddingError;
use crate::search::SearchError;
use crate::source::SourceError;
use crate::store::StoreError;

/// Errors surfaced by [`crate::ContractGraph`] operations
///
/// Validation violations and failed applies are not errors; they are
/// reported in `ValidationResult` and `ApplyResult`.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Record source missing or unreadable
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Engine configuration rejected
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The requested module is not in the graph
    #[error("Module not found: {module_id}")]
    NotFound { module_id: String },

    /// Graph store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Embedding provider could not be set up
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// Search precondition or embedding failure
    #[error(transparent)]
    Search(SearchError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl EngineError {
    pub fn not_found(module_id: impl Into<String>) -> Self {
        EngineError::NotFound {
            module_id: module_id.into(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        EngineError::InvalidInput(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound { .. })
    }

    /// Errors caused by the request rather than the infrastructure
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            EngineError::NotFound { .. }
                | EngineError::InvalidInput(_)
                | EngineError::Search(SearchError::ProviderNotReady)
        )
    }

    /// Configuration problems that no retry will fix
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            EngineError::Config(_)
                | EngineError::Source(SourceError::NotConfigured)
                | EngineError::Source(SourceError::MissingDirectory(_))
        )
    }
}

impl From<SearchError> for EngineError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::Store(e) => EngineError::Store(e),
            SearchError::Source(e) => EngineError::Source(e),
            SearchError::InvalidRequest(msg) => EngineError::InvalidInput(msg),
            other => EngineError::Search(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(EngineError::not_found("x").is_not_found());
        assert!(EngineError::not_found("x").is_user_error());
        assert!(EngineError::invalid_input("bad").is_user_error());
        assert!(!EngineError::Store(StoreError::PoolClosed).is_user_error());
        assert!(EngineError::Source(SourceError::NotConfigured).is_configuration());
    }

    #[test]
    fn test_search_errors_are_flattened() {
        let err: EngineError = SearchError::Store(StoreError::PoolClosed).into();
        assert!(matches!(err, EngineError::Store(StoreError::PoolClosed)));

        let err: EngineError = SearchError::InvalidRequest("limit".to_string()).into();
        assert!(matches!(err, EngineError::InvalidInput(_)));

        let err: EngineError = SearchError::ProviderNotReady.into();
        assert!(err.is_user_error());
    }

    #[test]
    fn test_not_found_message() {
        assert_eq!(
            EngineError::not_found("billing").to_string(),
            "Module not found: billing"
        );
    }
}
