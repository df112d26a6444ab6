use async_trait::async_trait;
use graph_flow::{Context, NextAction, Result, Task, TaskResult};
use regex::Regex;
use std::sync::LazyLock;
use tracing::info;

use super::context_keys;
use crate::models::{Decision, RiskLevel, Verdict};

pub const LOW_RISK_COLOR: &str = "#0aa037f7";
pub const MEDIUM_RISK_COLOR: &str = "#f1c30d";
pub const HIGH_RISK_COLOR: &str = "#f30404";
pub const UNKNOWN_RISK_COLOR: &str = "#facc15";

// "Risk Level", then the first risk word, then the first digit after it,
// all on one line. `.` does not cross line breaks.
static RISK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Risk Level.*?(Low|Medium|High).*?([0-9])").expect("Invalid regex")
});

impl Decision {
    pub fn for_level(risk_level: RiskLevel) -> Self {
        let (verdict, color) = match risk_level {
            RiskLevel::Low => (Verdict::Proceed, LOW_RISK_COLOR),
            RiskLevel::Medium => (Verdict::NeedReview, MEDIUM_RISK_COLOR),
            RiskLevel::High => (Verdict::Rejected, HIGH_RISK_COLOR),
            RiskLevel::Unknown => (Verdict::Review, UNKNOWN_RISK_COLOR),
        };
        Self {
            risk_level,
            verdict,
            color: color.to_string(),
        }
    }
}

/// Derive the risk level and verdict from the model's free-text answer.
///
/// The word test and the score test are OR-ed and the branches are tried
/// Low, Medium, High, so a low score wins over the word: "Risk Level: High,
/// score 2" is Low. Downstream consumers rely on this exact ordering.
pub fn extract_decision(text: &str) -> Decision {
    let Some(captures) = RISK_PATTERN.captures(text) else {
        return Decision::for_level(RiskLevel::Unknown);
    };
    let word = captures[1].to_lowercase();
    let Ok(score) = captures[2].parse::<u32>() else {
        return Decision::for_level(RiskLevel::Unknown);
    };

    let level = if word == "low" || score <= 2 {
        RiskLevel::Low
    } else if word == "medium" || score <= 3 {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    };
    Decision::for_level(level)
}

/// Classifies the recommendation produced by the previous task
pub struct DecisionTask;

#[async_trait]
impl Task for DecisionTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let recommendation: String = context.require(context_keys::RECOMMENDATION)?;

        let decision = extract_decision(&recommendation);
        info!(
            risk_level = %decision.risk_level,
            verdict = %decision.verdict,
            "Decision extracted"
        );
        let status = format!(
            "Risk level {} → {}",
            decision.risk_level, decision.verdict
        );
        context.set(context_keys::DECISION, &decision)?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::Continue,
            Some(status),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> (RiskLevel, Verdict) {
        let decision = extract_decision(text);
        (decision.risk_level, decision.verdict)
    }

    #[test]
    fn low_word_proceeds() {
        assert_eq!(
            classify("Risk Level: Low (score 1/5)"),
            (RiskLevel::Low, Verdict::Proceed)
        );
    }

    #[test]
    fn medium_with_low_score_is_classified_low() {
        assert_eq!(
            classify("- Risk Level: Medium, score 2"),
            (RiskLevel::Low, Verdict::Proceed)
        );
    }

    #[test]
    fn high_with_low_score_is_classified_low() {
        assert_eq!(
            classify("Risk Level: High, score 2"),
            (RiskLevel::Low, Verdict::Proceed)
        );
    }

    #[test]
    fn medium_with_mid_score_needs_review() {
        assert_eq!(
            classify("Risk Level: Medium (3)"),
            (RiskLevel::Medium, Verdict::NeedReview)
        );
        // The word alone is enough for Medium once the score is above 2
        assert_eq!(
            classify("Risk Level: Medium (5/5)"),
            (RiskLevel::Medium, Verdict::NeedReview)
        );
    }

    #[test]
    fn high_with_score_three_is_medium() {
        assert_eq!(
            classify("Risk Level: High - 3"),
            (RiskLevel::Medium, Verdict::NeedReview)
        );
    }

    #[test]
    fn high_with_high_score_is_rejected() {
        let decision = extract_decision("Risk Level: High (score 5)");
        assert_eq!(decision.risk_level, RiskLevel::High);
        assert_eq!(decision.verdict, Verdict::Rejected);
        assert_eq!(decision.color, HIGH_RISK_COLOR);
    }

    #[test]
    fn matching_is_case_insensitive_on_one_line() {
        let text = "Summary first.\n**RISK LEVEL:** high, score 4 out of 5\nReason: tariffs";
        assert_eq!(classify(text), (RiskLevel::High, Verdict::Rejected));
    }

    #[test]
    fn word_and_score_on_separate_lines_need_review() {
        assert_eq!(
            classify("- **Risk Level:** Medium\n- Score: 2"),
            (RiskLevel::Unknown, Verdict::Review)
        );
        assert_eq!(
            classify("**RISK LEVEL:**\nhigh\n\nScore: 4 out of 5"),
            (RiskLevel::Unknown, Verdict::Review)
        );
    }

    #[test]
    fn a_later_line_can_still_match() {
        let text = "Risk Level:\nRisk Level: Medium (3/5)";
        assert_eq!(classify(text), (RiskLevel::Medium, Verdict::NeedReview));
    }

    #[test]
    fn first_risk_word_after_the_phrase_wins() {
        // "low" inside "follow" is the first match of the alternation
        assert_eq!(
            classify("Risk Level: we follow up. High 5"),
            (RiskLevel::Low, Verdict::Proceed)
        );
    }

    #[test]
    fn missing_phrase_needs_review() {
        let decision = extract_decision("Recommendation: proceed. Risk is High, score 5.");
        assert_eq!(decision.risk_level, RiskLevel::Unknown);
        assert_eq!(decision.verdict, Verdict::Review);
        assert_eq!(decision.color, UNKNOWN_RISK_COLOR);
    }

    #[test]
    fn phrase_without_score_needs_review() {
        assert_eq!(
            classify("Risk Level: High"),
            (RiskLevel::Unknown, Verdict::Review)
        );
    }

    #[test]
    fn empty_text_needs_review() {
        assert_eq!(classify(""), (RiskLevel::Unknown, Verdict::Review));
    }

    #[tokio::test]
    async fn task_stores_the_decision() {
        let context = Context::new();
        context
            .set(context_keys::RECOMMENDATION, "Risk Level: Low (1)")
            .unwrap();

        DecisionTask.run(context.clone()).await.unwrap();

        let decision: Decision = context.require(context_keys::DECISION).unwrap();
        assert_eq!(decision.verdict, Verdict::Proceed);
        assert_eq!(decision.color, LOW_RISK_COLOR);
    }
}
