use axum::{
    Form, Router,
    extract::State,
    http::StatusCode,
    response::{Html, Json},
    routing::{get, post},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::{
    config::ServiceConfig,
    error::AnalysisError,
    models::{AnalyzeForm, AnalyzeRequest, ProcurementAnalysis},
    page::{PageBody, PageRenderer},
    workflow::ProcurementPipeline,
};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ProcurementPipeline>,
    pub pages: Arc<PageRenderer>,
}

pub fn create_app(config: &ServiceConfig) -> anyhow::Result<Router> {
    let pipeline = Arc::new(ProcurementPipeline::from_config(config));
    if config.preload_policy_index {
        spawn_index_warmup(&pipeline);
    }
    let pages = Arc::new(PageRenderer::new()?);
    Ok(build_router(AppState { pipeline, pages }))
}

/// Build the policy index in the background so the first request does not
/// pay for PDF extraction and embedding.
fn spawn_index_warmup(pipeline: &ProcurementPipeline) {
    let store = pipeline.policy_store();
    tokio::spawn(async move {
        if let Err(e) = store.index().await {
            warn!("Policy index warm-up failed: {}", e);
        }
    });
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/analyze", post(analyze_form))
        .route("/api/analyze", post(analyze_json))
        .route("/health", get(health_check))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

fn render_page(
    state: &AppState,
    status: StatusCode,
    request: &str,
    city: &str,
    body: PageBody<'_>,
) -> (StatusCode, Html<String>) {
    match state.pages.render(request, city, body) {
        Ok(html) => (status, Html(html)),
        Err(e) => {
            error!("Failed to render page: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html("<h1>Failed to render page</h1>".to_string()),
            )
        }
    }
}

async fn index(State(state): State<AppState>) -> (StatusCode, Html<String>) {
    render_page(
        &state,
        StatusCode::OK,
        "",
        state.pipeline.default_city(),
        PageBody::Empty,
    )
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn analyze_form(
    State(state): State<AppState>,
    Form(form): Form<AnalyzeForm>,
) -> (StatusCode, Html<String>) {
    let city = match form.city.trim() {
        "" => state.pipeline.default_city().to_string(),
        city => city.to_string(),
    };

    match state.pipeline.analyze(&form.request, &city).await {
        Ok(analysis) => render_page(
            &state,
            StatusCode::OK,
            &form.request,
            &city,
            PageBody::Analysis(&analysis),
        ),
        Err(e @ AnalysisError::EmptyRequest) => {
            let message = e.to_string();
            render_page(
                &state,
                StatusCode::OK,
                &form.request,
                &city,
                PageBody::Warning(&message),
            )
        }
        Err(e) => {
            error!("Procurement analysis failed: {}", e);
            let message = e.to_string();
            render_page(
                &state,
                StatusCode::INTERNAL_SERVER_ERROR,
                &form.request,
                &city,
                PageBody::Failure(&message),
            )
        }
    }
}

async fn analyze_json(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult<ProcurementAnalysis> {
    let city = request.city.as_deref().unwrap_or_default();
    info!("Starting procurement analysis via API");

    state
        .pipeline
        .analyze(&request.request, city)
        .await
        .map(Json)
        .map_err(|e| match e {
            AnalysisError::EmptyRequest => {
                warn!("Rejected blank procurement request");
                bad_request_error(&e.to_string())
            }
            AnalysisError::Workflow(_) => {
                error!("Procurement analysis failed: {}", e);
                internal_error("Procurement analysis failed", &e.to_string())
            }
        })
}
