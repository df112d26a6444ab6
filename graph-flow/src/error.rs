use thiserror::Error;

/// Result type alias for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task execution failed: {0}")]
    TaskExecutionFailed(String),

    #[error("Context error: {0}")]
    ContextError(String),

    #[error("Graph {0} has no start task")]
    NoStartTask(String),

    #[error("Graph {graph} exceeded {limit} steps")]
    StepLimitExceeded { graph: String, limit: usize },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
