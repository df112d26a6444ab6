use procurement_service::{ServiceConfig, create_app};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_LOG_FILTER: &str = "procurement_service=info,graph_flow=info,tower_http=info,ort=error";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = ServiceConfig::from_env()?;
    info!(
        model = %config.gemini_model,
        policy = %config.policy_pdf_path.display(),
        telegram = config.telegram.is_some(),
        "Configuration loaded"
    );

    let app = create_app(&config)?;
    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    let addr = listener.local_addr()?;

    info!("Procurement Intelligence Service starting on {}", addr);
    info!("Interactive page: http://{}/", addr);
    info!("Health check endpoint: http://{}/health", addr);
    info!("Analysis endpoint: POST http://{}/api/analyze", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
