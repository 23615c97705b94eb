//! Error types for the opsloop domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all opsloop operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A broken internal invariant (e.g. loop counter out of sync with
    /// history). These indicate implementation bugs, not user errors, and
    /// abort the run.
    #[error("Invariant violation: {0}")]
    Invariant(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response envelope: {0}")]
    MalformedEnvelope(String),

    /// The same request failed twice in a row. Fatal for the run.
    #[error("LLM call failed after retry (status: {status_code}): {body_prefix}")]
    RetriesExhausted { status_code: u16, body_prefix: String },
}

/// The failure taxonomy of the tool runner. All variants are recoverable:
/// they convert into a failed `ToolResult` and flow back to the Responder.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("path outside allowed root: {0}")]
    PathForbidden(String),

    #[error("command not allowed: {0}")]
    CommandForbidden(String),

    #[error("timeout")]
    Timeout { seconds: u64 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("io failure: {0}")]
    IoFailure(String),

    #[error("bad arguments: {0}")]
    BadArgs(String),
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::RetriesExhausted {
            status_code: 503,
            body_prefix: "upstream unavailable".into(),
        });
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("upstream unavailable"));
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = ToolError::PathForbidden("../../etc/passwd".into());
        assert!(err.to_string().contains("path outside allowed root"));

        let err = ToolError::CommandForbidden("rm".into());
        assert!(err.to_string().contains("rm"));

        let err = ToolError::Timeout { seconds: 2 };
        assert_eq!(err.to_string(), "timeout");
    }
}
