//! Failure taxonomy for routing and agent execution.
//!
//! Validation errors are raised before the engine is touched; execution
//! errors wrap whatever the engine reported. The HTTP status mapping lives
//! in the serve crate.

/// Errors surfaced by the registry, factory, router, and engines.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Requested node is not in the registry. User input error.
    #[error("unknown node: {0}")]
    UnknownNode(String),
    /// A registered node has no prompt document. Configuration integrity
    /// error; fatal at startup verification.
    #[error("no prompt document for node: {0}")]
    PromptNotFound(String),
    /// The engine failed mid-turn (model call, stream, or request build).
    #[error("agent execution failed: {0}")]
    ExecutionFailed(String),
    /// The thread store could not load or save conversation state.
    #[error("thread state unavailable: {0}")]
    StateUnavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Display of each variant names its condition.
    #[test]
    fn display_covers_all_variants() {
        assert!(AgentError::UnknownNode("x".into())
            .to_string()
            .contains("unknown node"));
        assert!(AgentError::PromptNotFound("x".into())
            .to_string()
            .contains("prompt"));
        assert!(AgentError::ExecutionFailed("boom".into())
            .to_string()
            .contains("execution failed"));
        assert!(AgentError::StateUnavailable("down".into())
            .to_string()
            .contains("state unavailable"));
    }
}
