pub mod config;
pub mod error;
pub mod models;
pub mod page;
pub mod service;
pub mod tasks;
pub mod workflow;

pub use config::ServiceConfig;
pub use error::{AnalysisError, ConfigError};
pub use models::*;
pub use service::{AppState, build_router, create_app};
pub use workflow::{PipelineParts, ProcurementPipeline, build_procurement_workflow};
