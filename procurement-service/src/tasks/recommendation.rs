use async_trait::async_trait;
use graph_flow::GraphError::TaskExecutionFailed;
use graph_flow::{Context, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::info;

use super::context_keys;
use super::policy_store::{PolicyIndex, PolicyStore, ScoredPassage};
use super::utils::LanguageModel;
use crate::models::LiveMetrics;

/// Passages handed to the model for the policy question
pub const DEFAULT_TOP_K: usize = 4;

/// Question-answering prompt over the retrieved policy passages
pub fn policy_question_prompt(passages: &[ScoredPassage], question: &str) -> String {
    let context = passages
        .iter()
        .map(|passage| passage.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Use the following pieces of context to answer the question at the end. \
         If you don't know the answer, just say that you don't know, don't try to make up an answer.\n\n\
         {context}\n\n\
         Question: {question}\n\
         Helpful Answer:"
    )
}

pub fn recommendation_prompt(request: &str, policy_summary: &str, metrics: &LiveMetrics) -> String {
    format!(
        r#"
Procurement Request: "{request}"
Policy Summary: "{policy_summary}"
Forex (USD→INR): {forex}
Weather: {weather}

Provide a concise structured procurement recommendation:
- Recommendation
- Risk Level (Low/Medium/High with score 1–5)
- Reason
- Policy Compliance (Compliant / Issues found)
- Next Steps
"#,
        forex = metrics.forex_display(),
        weather = metrics.weather_summary(),
    )
}

/// Asks the language model about the policy and for the final recommendation
pub struct ProcurementAdvisor {
    model: Arc<dyn LanguageModel>,
    top_k: usize,
}

impl ProcurementAdvisor {
    pub fn new(model: Arc<dyn LanguageModel>, top_k: usize) -> Self {
        Self { model, top_k }
    }

    /// Retrieval-augmented answer to the raw request, used as the policy summary
    pub async fn summarize_policy(&self, index: &PolicyIndex, request: &str) -> anyhow::Result<String> {
        let passages = index.search(request, self.top_k).await?;
        info!(passages = passages.len(), "Retrieved policy passages");
        self.model
            .complete(&policy_question_prompt(&passages, request))
            .await
    }

    pub async fn recommend(
        &self,
        request: &str,
        policy_summary: &str,
        metrics: &LiveMetrics,
    ) -> anyhow::Result<String> {
        self.model
            .complete(&recommendation_prompt(request, policy_summary, metrics))
            .await
    }
}

/// Queries the policy index with the request text
pub struct PolicyLookupTask {
    store: Arc<PolicyStore>,
    advisor: Arc<ProcurementAdvisor>,
}

impl PolicyLookupTask {
    pub fn new(store: Arc<PolicyStore>, advisor: Arc<ProcurementAdvisor>) -> Self {
        Self { store, advisor }
    }
}

#[async_trait]
impl Task for PolicyLookupTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let request: String = context.require(context_keys::REQUEST)?;

        let index = self
            .store
            .index()
            .await
            .map_err(|e| TaskExecutionFailed(format!("Policy index unavailable: {}", e)))?;

        let summary = self
            .advisor
            .summarize_policy(&index, &request)
            .await
            .map_err(|e| TaskExecutionFailed(format!("Policy lookup failed: {}", e)))?;

        info!(summary_chars = summary.chars().count(), "Policy summary generated");
        context.set(context_keys::POLICY_SUMMARY, &summary)?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::Continue,
            Some("Policy passages retrieved and summarized".to_string()),
        ))
    }
}

/// Produces the structured recommendation text
pub struct RecommendationTask {
    advisor: Arc<ProcurementAdvisor>,
}

impl RecommendationTask {
    pub fn new(advisor: Arc<ProcurementAdvisor>) -> Self {
        Self { advisor }
    }
}

#[async_trait]
impl Task for RecommendationTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let request: String = context.require(context_keys::REQUEST)?;
        let policy_summary: String = context.require(context_keys::POLICY_SUMMARY)?;
        let metrics: LiveMetrics = context.require(context_keys::METRICS)?;

        let recommendation = self
            .advisor
            .recommend(&request, &policy_summary, &metrics)
            .await
            .map_err(|e| TaskExecutionFailed(format!("Recommendation failed: {}", e)))?;

        info!(
            recommendation_chars = recommendation.chars().count(),
            "Recommendation generated"
        );
        context.set(context_keys::RECOMMENDATION, &recommendation)?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::Continue,
            Some("Recommendation generated".to_string()),
        ))
    }
}
