use graph_flow::GraphError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{key} has an invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Please enter a procurement request.")]
    EmptyRequest,

    #[error("Procurement workflow failed: {0}")]
    Workflow(#[from] GraphError),
}
