//! Error types for Cortex Core.

use cortex_abstraction::ModelError;
use thiserror::Error;

/// Core error type for Cortex operations.
#[derive(Error, Debug)]
pub enum CortexError {
    /// Configuration errors (profiles, environment, pricing tables).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An escalation target or requested expert is not registered.
    #[error("Expert not found: {0}")]
    ExpertNotFound(String),

    /// An expert failed to evaluate a request.
    #[error("Evaluation failed for expert '{expert}': {reason}")]
    Evaluation {
        /// Expert name
        expert: String,
        /// Reason for the failure
        reason: String,
    },

    /// The terminal expert's model call failed.
    #[error("Execution failed for expert '{expert}': {source}")]
    Execution {
        /// Expert name
        expert: String,
        /// Underlying model error
        #[source]
        source: ModelError,
    },

    /// The escalation walk revisited an expert or ran past its hop limit.
    #[error("Escalation loop detected: {}", .path.join(" -> "))]
    EscalationLoopDetected {
        /// Experts visited, in order
        path: Vec<String>,
    },

    /// The caller cancelled the request.
    #[error("Request cancelled")]
    Cancelled,

    /// Performance log persistence errors.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Model service resolution errors.
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

/// Result type alias for Cortex operations.
pub type Result<T> = std::result::Result<T, CortexError>;
