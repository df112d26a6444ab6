pub mod decision;
pub mod live_data;
pub mod notifier;
pub mod policy_store;
pub mod recommendation;
pub mod utils;

pub use decision::{DecisionTask, extract_decision};
pub use live_data::{LiveDataClient, LiveMetricsTask};
pub use notifier::{NotificationTask, Notifier, TelegramNotifier, chunk_message};
pub use policy_store::{PolicyIndex, PolicyStore, ScoredPassage};
pub use recommendation::{PolicyLookupTask, ProcurementAdvisor, RecommendationTask};
pub use utils::{Embedder, FastEmbedder, GeminiModel, LanguageModel};

/// Keys the pipeline tasks use in the shared context
pub mod context_keys {
    pub const REQUEST: &str = "procurement_request";
    pub const CITY: &str = "city";
    pub const METRICS: &str = "live_metrics";
    pub const POLICY_SUMMARY: &str = "policy_summary";
    pub const RECOMMENDATION: &str = "recommendation";
    pub const DECISION: &str = "decision";
    pub const NOTIFICATION: &str = "notification";
}
