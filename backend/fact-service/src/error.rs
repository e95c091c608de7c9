/// Error types for fact-service
use crate::category::CategoryError;
use crate::content::ContentError;
use story_cache::CacheError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Fact queue is empty")]
    EmptyQueue,

    #[error("Category exhausted: {0}")]
    Exhausted(String),

    #[error("Not enough affinity data: {populated} of {required} categories populated")]
    InsufficientData { populated: usize, required: usize },

    #[error("Store error: {0}")]
    Store(#[from] CacheError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Content fetch error: {0}")]
    Fetch(#[from] ContentError),

    #[error("Category provider error: {0}")]
    Category(#[from] CategoryError),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Fact {fact_id} stored but {stage} failed: {source}")]
    PartialWrite {
        fact_id: String,
        stage: &'static str,
        #[source]
        source: CacheError,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Cache underrun or missing data; callers serve a default instead.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ServiceError::NotFound(_)
                | ServiceError::EmptyQueue
                | ServiceError::Exhausted(_)
                | ServiceError::InsufficientData { .. }
        )
    }

    /// Connectivity or timeout failures worth retrying on the next tick.
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Store(e) => e.is_transient(),
            ServiceError::PartialWrite { source, .. } => source.is_transient(),
            ServiceError::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            ServiceError::Fetch(e) => e.is_transient(),
            ServiceError::Timeout(_) => true,
            _ => false,
        }
    }

    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => "not_found",
            ServiceError::EmptyQueue => "empty_queue",
            ServiceError::Exhausted(_) => "exhausted",
            ServiceError::InsufficientData { .. } => "insufficient_data",
            ServiceError::Store(_) => "store",
            ServiceError::Database(_) => "database",
            ServiceError::Timeout(_) => "timeout",
            ServiceError::Fetch(_) => "fetch",
            ServiceError::Category(_) => "category",
            ServiceError::Validation(_) => "validation",
            ServiceError::PartialWrite { .. } => "partial_write",
            ServiceError::Config(_) => "config",
            ServiceError::Internal(_) => "internal",
        }
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_recoverable_errors() {
        assert!(ServiceError::EmptyQueue.is_recoverable());
        assert!(ServiceError::Exhausted("Go".into()).is_recoverable());
        assert!(ServiceError::InsufficientData {
            populated: 3,
            required: 10
        }
        .is_recoverable());
        assert!(!ServiceError::Internal("boom".into()).is_recoverable());
    }

    #[test]
    fn test_transient_errors() {
        assert!(ServiceError::Store(CacheError::Timeout(Duration::from_millis(500))).is_transient());
        assert!(ServiceError::Fetch(ContentError::Unavailable("503".into())).is_transient());
        assert!(!ServiceError::Fetch(ContentError::UnknownCategory("X".into())).is_transient());
        assert!(!ServiceError::Validation("empty".into()).is_transient());
    }
}
