use chrono::{FixedOffset, Offset, Utc};
use graph_flow::{Context, Graph, GraphBuilder, Task};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::error::AnalysisError;
use crate::models::ProcurementAnalysis;
use crate::tasks::{
    DecisionTask, FastEmbedder, GeminiModel, LanguageModel, LiveDataClient, LiveMetricsTask,
    NotificationTask, Notifier, PolicyLookupTask, PolicyStore, ProcurementAdvisor,
    RecommendationTask, TelegramNotifier, context_keys,
};

const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

/// Collaborators the pipeline tasks are built from
pub struct PipelineParts {
    pub live_data: LiveDataClient,
    pub policy_store: Arc<PolicyStore>,
    pub model: Arc<dyn LanguageModel>,
    pub notifier: Option<Arc<dyn Notifier>>,
    pub top_k: usize,
}

impl PipelineParts {
    pub fn from_config(config: &ServiceConfig) -> Self {
        let embedder = Arc::new(FastEmbedder::new(config.embedding_model_dir.clone()));
        let notifier = config
            .telegram
            .as_ref()
            .map(|telegram| Arc::new(TelegramNotifier::new(telegram)) as Arc<dyn Notifier>);

        Self {
            live_data: LiveDataClient::from_config(config),
            policy_store: Arc::new(PolicyStore::new(config.policy_pdf_path.clone(), embedder)),
            model: Arc::new(GeminiModel::new(
                config.gemini_api_key.expose_secret(),
                &config.gemini_model,
            )),
            notifier,
            top_k: config.retrieval_top_k,
        }
    }
}

/// live metrics → policy lookup → recommendation → decision → notification
pub fn build_procurement_workflow(parts: &PipelineParts) -> Graph {
    let advisor = Arc::new(ProcurementAdvisor::new(Arc::clone(&parts.model), parts.top_k));

    let metrics_task: Arc<dyn Task> = Arc::new(LiveMetricsTask::new(parts.live_data.clone()));
    let lookup_task: Arc<dyn Task> = Arc::new(PolicyLookupTask::new(
        Arc::clone(&parts.policy_store),
        Arc::clone(&advisor),
    ));
    let recommend_task: Arc<dyn Task> = Arc::new(RecommendationTask::new(advisor));
    let decision_task: Arc<dyn Task> = Arc::new(DecisionTask);
    let notify_task: Arc<dyn Task> = Arc::new(NotificationTask::new(parts.notifier.clone()));

    let metrics_id = metrics_task.id().to_string();
    let lookup_id = lookup_task.id().to_string();
    let recommend_id = recommend_task.id().to_string();
    let decision_id = decision_task.id().to_string();
    let notify_id = notify_task.id().to_string();

    GraphBuilder::new("procurement_flow")
        .add_task(metrics_task)
        .add_task(lookup_task)
        .add_task(recommend_task)
        .add_task(decision_task)
        .add_task(notify_task)
        .add_edge(&metrics_id, &lookup_id)
        .add_edge(&lookup_id, &recommend_id)
        .add_edge(&recommend_id, &decision_id)
        .add_edge(&decision_id, &notify_id)
        .build()
}

/// Request/response entry point over the procurement workflow
pub struct ProcurementPipeline {
    graph: Graph,
    policy_store: Arc<PolicyStore>,
    default_city: String,
}

impl ProcurementPipeline {
    pub fn new(parts: PipelineParts, default_city: impl Into<String>) -> Self {
        Self {
            graph: build_procurement_workflow(&parts),
            policy_store: parts.policy_store,
            default_city: default_city.into(),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(PipelineParts::from_config(config), config.default_city.clone())
    }

    pub fn default_city(&self) -> &str {
        &self.default_city
    }

    pub fn policy_store(&self) -> Arc<PolicyStore> {
        Arc::clone(&self.policy_store)
    }

    /// Run the whole chain for one request. A blank city falls back to the
    /// default city; a blank request is rejected before anything runs.
    pub async fn analyze(
        &self,
        request: &str,
        city: &str,
    ) -> Result<ProcurementAnalysis, AnalysisError> {
        if request.trim().is_empty() {
            return Err(AnalysisError::EmptyRequest);
        }
        let city = match city.trim() {
            "" => self.default_city.as_str(),
            city => city,
        };

        let analysis_id = Uuid::new_v4().to_string();
        let context = Context::new();
        context.set(context_keys::REQUEST, request)?;
        context.set(context_keys::CITY, city)?;

        let span = info_span!("analysis", id = %analysis_id, %city);
        let execution = self
            .graph
            .execute(context.clone())
            .instrument(span)
            .await?;

        let analysis = ProcurementAnalysis {
            analysis_id,
            request: request.to_string(),
            city: city.to_string(),
            metrics: context.require(context_keys::METRICS)?,
            policy_summary: context.require(context_keys::POLICY_SUMMARY)?,
            recommendation: context.require(context_keys::RECOMMENDATION)?,
            decision: context.require(context_keys::DECISION)?,
            notification: context.require(context_keys::NOTIFICATION)?,
            generated_at: Utc::now().with_timezone(&kolkata_offset()),
            steps: execution.status_messages(),
        };

        info!(
            id = %analysis.analysis_id,
            verdict = %analysis.decision.verdict,
            "Procurement analysis completed"
        );
        Ok(analysis)
    }
}

/// Asia/Kolkata has no daylight saving, a fixed offset is exact
pub fn kolkata_offset() -> FixedOffset {
    FixedOffset::east_opt(IST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NotificationStatus, RiskLevel, Verdict};
    use crate::tasks::Embedder;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DEAD_URL: &str = "http://127.0.0.1:1/unreachable";

    struct FixedModel(&'static str);

    #[async_trait]
    impl LanguageModel for FixedModel {
        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[derive(Default)]
    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, texts: Vec<String>) -> anyhow::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn deliver(&self, text: &str) -> usize {
            self.sent.lock().unwrap().push(text.to_string());
            1
        }
    }

    fn pipeline(
        reply: &'static str,
        embedder: Arc<CountingEmbedder>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> ProcurementPipeline {
        let parts = PipelineParts {
            live_data: LiveDataClient::new(DEAD_URL, DEAD_URL, None),
            policy_store: Arc::new(PolicyStore::new("/nonexistent.pdf", embedder)),
            model: Arc::new(FixedModel(reply)),
            notifier,
            top_k: 4,
        };
        ProcurementPipeline::new(parts, "Chennai")
    }

    #[tokio::test]
    async fn runs_every_step_and_assembles_the_analysis() {
        let notifier = Arc::new(RecordingNotifier::default());
        let pipeline = pipeline(
            "Recommendation: hold\nRisk Level: High (score 5)",
            Arc::new(CountingEmbedder::default()),
            Some(notifier.clone()),
        );

        let analysis = pipeline
            .analyze("Import 500 servers from the USA", "Mumbai")
            .await
            .unwrap();

        assert_eq!(analysis.city, "Mumbai");
        assert_eq!(analysis.decision.risk_level, RiskLevel::High);
        assert_eq!(analysis.decision.verdict, Verdict::Rejected);
        assert!(analysis.metrics.forex.is_err());
        assert_eq!(analysis.notification, NotificationStatus::Delivered { chunks: 1 });
        assert_eq!(analysis.steps.len(), 5);
        assert_eq!(analysis.generated_at.offset().local_minus_utc(), IST_OFFSET_SECS);
        assert_eq!(
            notifier.sent.lock().unwrap().as_slice(),
            &[analysis.recommendation.clone()]
        );
    }

    #[tokio::test]
    async fn blank_request_is_rejected_before_running() {
        let embedder = Arc::new(CountingEmbedder::default());
        let pipeline = pipeline("unused", embedder.clone(), None);

        let err = pipeline.analyze("   \n", "Chennai").await.unwrap_err();

        assert!(matches!(err, AnalysisError::EmptyRequest));
        assert!(!pipeline.policy_store().is_loaded());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn blank_city_uses_the_default() {
        let pipeline = pipeline("no risk phrase", Arc::new(CountingEmbedder::default()), None);

        let analysis = pipeline.analyze("Buy desks", " ").await.unwrap();

        assert_eq!(analysis.city, "Chennai");
        assert_eq!(analysis.decision.verdict, Verdict::Review);
        assert!(matches!(
            analysis.notification,
            NotificationStatus::Skipped { .. }
        ));
    }

    #[tokio::test]
    async fn policy_index_is_shared_across_requests() {
        let embedder = Arc::new(CountingEmbedder::default());
        let pipeline = pipeline("Risk Level: Low 1", embedder.clone(), None);

        pipeline.analyze("Buy desks", "Chennai").await.unwrap();
        pipeline.analyze("Buy chairs", "Chennai").await.unwrap();

        // one document embedding plus one query embedding per request
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }
}
