//! Lifecycle-specific error types

use super::Phase;
use std::sync::Arc;
use thiserror::Error;

/// Boxed, shareable cause of an initializer failure
pub type HandlerError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while ordering or executing stages
///
/// The type is `Clone` so that a memoized operation outcome can be handed to
/// every caller that awaits it.
#[derive(Debug, Clone, Error)]
pub enum LifecycleError {
    /// The before/after constraints of a stage form a cycle
    #[error("Cyclic dependency in stage {stage}: {}", .nodes.join(", "))]
    CyclicDependency {
        /// Name of the stage whose constraints are cyclic
        stage: String,
        /// Names that could not be placed in the load order
        nodes: Vec<String>,
    },

    /// An initializer handler returned an error or panicked
    #[error("Initializer {initializer} failed in stage {stage}: {source}")]
    InitializerFailed {
        /// Name of the stage being executed
        stage: String,
        /// Name of the initializer that failed
        initializer: String,
        /// Underlying handler error
        #[source]
        source: HandlerError,
    },

    /// A whole stage failed while the orchestrator was unwinding
    #[error("Stage {stage} failed during {phase}: {source}")]
    StageFailed {
        /// Stage name, without the phase suffix
        stage: String,
        /// Phase that was running
        phase: Phase,
        /// What went wrong inside the stage
        #[source]
        source: Box<LifecycleError>,
    },

    /// A setup stage was requested after shutdown began
    #[error("Cannot run stage {0}: shutdown has begun")]
    ShuttingDown(String),

    /// A stage name that is not part of the configured stage order
    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    /// The same stage name appeared twice in a stage order
    #[error("Duplicate stage: {0}")]
    DuplicateStage(String),
}

impl LifecycleError {
    /// Create a cyclic dependency error
    pub fn cyclic(stage: impl Into<String>, nodes: Vec<String>) -> Self {
        Self::CyclicDependency {
            stage: stage.into(),
            nodes,
        }
    }

    /// Create an initializer failure from a handler error
    pub fn initializer_failed(
        stage: impl Into<String>,
        initializer: impl Into<String>,
        err: anyhow::Error,
    ) -> Self {
        let source: Box<dyn std::error::Error + Send + Sync + 'static> = err.into();
        Self::InitializerFailed {
            stage: stage.into(),
            initializer: initializer.into(),
            source: Arc::from(source),
        }
    }

    /// Wrap a failure that happened while running `phase` of `stage`
    pub fn stage_failed(stage: impl Into<String>, phase: Phase, source: LifecycleError) -> Self {
        Self::StageFailed {
            stage: stage.into(),
            phase,
            source: Box::new(source),
        }
    }

    /// Returns true if this error, or the error it wraps, is a cycle
    pub fn is_cyclic(&self) -> bool {
        match self {
            Self::CyclicDependency { .. } => true,
            Self::StageFailed { source, .. } => source.is_cyclic(),
            _ => false,
        }
    }
}

/// A specialized Result type for lifecycle operations
pub type Result<T> = std::result::Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initializer_failure_keeps_message() {
        let err = LifecycleError::initializer_failed(
            "connections.setup",
            "db.connect",
            anyhow::anyhow!("connection refused"),
        );
        assert_eq!(
            err.to_string(),
            "Initializer db.connect failed in stage connections.setup: connection refused"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_stage_failure_wraps_cycle() {
        let cycle = LifecycleError::cyclic("running.teardown", vec!["a".into(), "b".into()]);
        let err = LifecycleError::stage_failed("running", Phase::Teardown, cycle);
        assert!(err.is_cyclic());
        assert_eq!(
            err.to_string(),
            concat!(
                "Stage running failed during teardown: ",
                "Cyclic dependency in stage running.teardown: a, b"
            )
        );
    }
}
