use serde::Serialize;
use tera::{Context, Tera};

use crate::models::{NotificationStatus, ProcurementAnalysis};

const INDEX_TEMPLATE: &str = "index.html";

/// What the page shows below the form
pub enum PageBody<'a> {
    Empty,
    Warning(&'a str),
    Failure(&'a str),
    Analysis(&'a ProcurementAnalysis),
}

/// Display-ready values for the results section
#[derive(Debug, Serialize)]
struct AnalysisView {
    forex: String,
    city: String,
    temperature: String,
    weather: String,
    date: String,
    time: String,
    color: String,
    badge: String,
    risk_level: String,
    generated: String,
    recommendation: String,
    delivered: bool,
    skip_reason: Option<String>,
}

impl AnalysisView {
    fn from_analysis(analysis: &ProcurementAnalysis) -> Self {
        let metrics = &analysis.metrics;
        let decision = &analysis.decision;
        let at = analysis.generated_at;
        let (delivered, skip_reason) = match &analysis.notification {
            NotificationStatus::Delivered { .. } => (true, None),
            NotificationStatus::Skipped { reason } => (false, Some(reason.clone())),
        };

        Self {
            forex: metrics.forex_display(),
            city: analysis.city.clone(),
            temperature: metrics.temperature_display(),
            weather: metrics.weather_description(),
            date: at.format("%b %d, %Y").to_string(),
            time: at.format("%I:%M %p").to_string(),
            color: decision.color.clone(),
            badge: decision.verdict.badge(),
            risk_level: decision.risk_level.to_string(),
            generated: at.format("%B %d, %Y at %I:%M %p").to_string(),
            recommendation: analysis.recommendation.clone(),
            delivered,
            skip_reason,
        }
    }
}

/// Tera renderer for the interactive page. `.html` templates are
/// autoescaped, so request text and model output go in verbatim.
pub struct PageRenderer {
    tera: Tera,
}

impl PageRenderer {
    pub fn new() -> tera::Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template(INDEX_TEMPLATE, include_str!("../templates/index.html"))?;
        Ok(Self { tera })
    }

    /// Full page: form pre-filled with `request` and `city`, then `body`
    pub fn render(&self, request: &str, city: &str, body: PageBody<'_>) -> tera::Result<String> {
        let mut context = Context::new();
        context.insert("request", request);
        context.insert("city", city);

        let (warning, failure, analysis) = match body {
            PageBody::Empty => (None, None, None),
            PageBody::Warning(message) => (Some(message), None, None),
            PageBody::Failure(message) => (None, Some(message), None),
            PageBody::Analysis(analysis) => (None, None, Some(AnalysisView::from_analysis(analysis))),
        };
        context.insert("warning", &warning);
        context.insert("failure", &failure);
        context.insert("analysis", &analysis);

        self.tera.render(INDEX_TEMPLATE, &context)
    }
}
