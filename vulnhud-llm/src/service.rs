//! Analysis service boundary
//!
//! The engine only needs "text in, text out" from the model service plus a
//! classification of failures: rate limiting is worth retrying, anything else
//! is not.

use async_trait::async_trait;

/// Failure reported by an [`AnalysisService`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// Service is overloaded or rate-limited; the call may be retried
    #[error("rate limited: {0}")]
    Transient(String),

    /// Any other failure; the run is aborted
    #[error("{0}")]
    Fatal(String),
}

impl ServiceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Transient(_))
    }
}

/// A language-model service that turns one prompt into one text response
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Send a single text payload and return the response text
    async fn generate(&self, payload: &str) -> Result<String, ServiceError>;
}
