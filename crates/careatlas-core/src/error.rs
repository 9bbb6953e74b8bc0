//! Error types for careatlas-core.
//!
//! A single [`CoreError`] covers every failure the engine can surface.
//! Per-request failures are recoverable and end up recorded in the response
//! trace; only corpus-load failures are fatal (the process cannot serve
//! queries without a corpus).

use thiserror::Error;

/// Result alias used throughout the workspace.
pub type CoreResult<T> = Result<T, CoreError>;

/// Unified error type for the CareAtlas engine.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The inbound query failed boundary validation (empty, or over the
    /// 2000-character limit). Never reaches the classifier.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A place name could not be resolved against the gazetteer.
    #[error("unknown location: {0}")]
    Geocode(String),

    /// The vector index (or an embedding call backing it) failed.
    #[error("index error: {0}")]
    Index(String),

    /// The embedding provider failed or produced a malformed vector.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// The LLM collaborator timed out or returned an error. Callers must
    /// degrade gracefully (regex classification, concatenated summary).
    #[error("llm unavailable: {0}")]
    LlmUnavailable(String),

    /// Too few complete feature vectors (or a singular covariance) for the
    /// Mahalanobis stage. The caller skips stage 2 rather than failing.
    #[error("degenerate features: {0}")]
    DegenerateFeatures(String),

    /// An agent failed mid-plan. Recorded in the trace; the remaining plan
    /// continues and the response is marked partial.
    #[error("agent '{agent}' failed: {message}")]
    Agent { agent: String, message: String },

    /// The corpus snapshot could not be loaded or failed validation.
    /// This is the only fatal error: the engine refuses to start.
    #[error("corpus error: {0}")]
    Corpus(String),

    /// Static data file (gazetteer, pattern sets) failed to parse.
    #[error("config error: {0}")]
    Config(String),
}

impl CoreError {
    /// Whether the engine can continue serving after this error.
    ///
    /// Everything except corpus/config failures is a per-request condition.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CoreError::Corpus(_) | CoreError::Config(_))
    }

    /// Convenience constructor for agent failures.
    pub fn agent(agent: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::Agent {
            agent: agent.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverability_classification() {
        assert!(CoreError::Geocode("tamale".into()).is_recoverable());
        assert!(CoreError::LlmUnavailable("timeout".into()).is_recoverable());
        assert!(!CoreError::Corpus("duplicate id".into()).is_recoverable());
        assert!(!CoreError::Config("bad gazetteer".into()).is_recoverable());
    }

    #[test]
    fn agent_error_message_includes_agent_name() {
        let err = CoreError::agent("planner", "no facilities with coordinates");
        assert_eq!(
            err.to_string(),
            "agent 'planner' failed: no facilities with coordinates"
        );
    }
}
