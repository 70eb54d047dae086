//! vulnhud LLM - two-phase vulnerability analysis engine
//!
//! Every source unit is analysed by an external language model together with
//! one shared, project-wide context:
//!
//! 1. A structural digest of all units (type and member names) is sent once
//!    and the answer becomes the [`GlobalContext`].
//! 2. Each unit is then sent with that context under a bounded number of
//!    concurrent calls; findings are merged into a single [`Report`].
//!
//! Rate-limited calls are retried with exponential backoff. Any other service
//! failure aborts the run and suppresses the report.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod service;
pub mod gemini;
pub mod retry;
pub mod unit;
pub mod context;
pub mod analysis;
pub mod scheduler;
pub mod aggregator;
pub mod prompts;
pub mod config;
pub mod orchestrator;

// Re-export main types for convenience
pub use service::{AnalysisService, ServiceError};
pub use gemini::GeminiClient;
pub use retry::{RetryingClient, RetryPolicy, RetryObserver, AttemptRecord, AttemptOutcome};
pub use unit::{SourceUnit, UnitSource, FileSystemSource};
pub use context::{
    ContextBuilder, GlobalContext, StructuralSummarizer, RegexSummarizer,
    StructuralDigest, UnitDigest, Parsed, parse_global_context,
};
pub use analysis::{AnalysisResult, Finding, parse_unit_response, build_unit_payload};
pub use scheduler::{BoundedScheduler, FatalPolicy, DispatchSummary, SkippedUnit};
pub use aggregator::{ResultAggregator, Report};
pub use prompts::PromptSet;
pub use config::{ScanConfig, RunSettings};
pub use orchestrator::{Orchestrator, RunState, RunOutcome, RunSummary, REPORT_FILE_NAME};

/// Result type for LLM operations
pub type LlmResult<T> = std::result::Result<T, LlmError>;

/// Error types for LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Required configuration missing or invalid; the run never starts
    #[error("Configuration error: {0}")]
    Config(String),

    /// Fatal service failure (including exhausted rate-limit retries); aborts the run
    #[error("Analysis service error: {0}")]
    Service(#[from] ServiceError),

    /// Response could not be read as the expected JSON object
    #[error("Malformed response for {unit}: {reason}")]
    MalformedResponse { unit: String, reason: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client construction error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Utility error (discovery, artifact writing)
    #[error("Utility error: {0}")]
    Util(#[from] vulnhud_utils::UtilError),

    /// A per-unit task ended without producing a result
    #[error("Task failed: {0}")]
    TaskFailed(String),

    /// The orchestrator was driven out of order (e.g. run twice)
    #[error("Invalid run state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

impl LlmError {
    /// Whether this error aborts the whole run rather than a single unit
    pub fn is_fatal(&self) -> bool {
        matches!(self, LlmError::Service(_))
    }

    /// Whether this error is a configuration or environment problem
    ///
    /// Only meaningful for errors raised before dispatch; a run that reached
    /// [`RunState::Fatal`] was aborted whatever the cause.
    pub fn is_config(&self) -> bool {
        matches!(self, LlmError::Config(_) | LlmError::Util(_))
    }
}

/// Serialize with 4-space indentation (report and digest layout)
pub(crate) fn to_pretty_json<T: serde::Serialize>(value: &T) -> LlmResult<String> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    value.serialize(&mut serializer)?;
    String::from_utf8(buffer)
        .map_err(|e| LlmError::TaskFailed(format!("Serialized JSON is not UTF-8: {}", e)))
}
