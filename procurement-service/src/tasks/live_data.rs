use anyhow::anyhow;
use async_trait::async_trait;
use graph_flow::{Context, NextAction, Result, Task, TaskResult};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{info, warn};

use super::context_keys;
use crate::config::ServiceConfig;
use crate::models::{FetchFailure, LiveFeed, LiveMetrics, WeatherReport};

pub const FOREX_ENDPOINT: &str = "https://api.coingecko.com/api/v3/simple/price";
pub const WEATHER_ENDPOINT: &str = "http://api.openweathermap.org/data/2.5/weather";

/// Read-only client for the public currency and weather endpoints.
///
/// Every failure is folded into a [`FetchFailure`]; nothing here returns an
/// error to the pipeline.
#[derive(Clone)]
pub struct LiveDataClient {
    http: Client,
    forex_url: String,
    weather_url: String,
    weather_api_key: Option<SecretString>,
}

impl LiveDataClient {
    pub fn new(
        forex_url: impl Into<String>,
        weather_url: impl Into<String>,
        weather_api_key: Option<SecretString>,
    ) -> Self {
        Self {
            http: Client::new(),
            forex_url: forex_url.into(),
            weather_url: weather_url.into(),
            weather_api_key,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            config.forex_api_url.clone(),
            config.weather_api_url.clone(),
            config.openweather_api_key.clone(),
        )
    }

    /// USD→INR rate rounded to two decimals
    pub async fn fetch_forex_rate(&self) -> std::result::Result<f64, FetchFailure> {
        self.request_forex_rate().await.map_err(|e| {
            warn!(error = %e, "Forex rate unavailable");
            FetchFailure::Unavailable {
                feed: LiveFeed::Forex,
                reason: e.to_string(),
            }
        })
    }

    async fn request_forex_rate(&self) -> anyhow::Result<f64> {
        let response = self
            .http
            .get(&self.forex_url)
            .query(&[("ids", "usd"), ("vs_currencies", "inr")])
            .send()
            .await?;

        let data: Value = response.json().await?;
        let rate = data["usd"]["inr"]
            .as_f64()
            .ok_or_else(|| anyhow!("usd.inr missing from response"))?;

        Ok(round_to_cents(rate))
    }

    /// Current conditions for `city` in metric units
    pub async fn fetch_weather(&self, city: &str) -> std::result::Result<WeatherReport, FetchFailure> {
        match self.request_weather(city).await {
            Ok(Some(report)) => Ok(report),
            Ok(None) => {
                warn!(%city, "Weather lookup found no such city");
                Err(FetchFailure::CityNotFound {
                    city: city.to_string(),
                })
            }
            Err(e) => {
                warn!(%city, error = %e, "Weather unavailable");
                Err(FetchFailure::Unavailable {
                    feed: LiveFeed::Weather,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// `Ok(None)` when the service does not recognise the city
    async fn request_weather(&self, city: &str) -> anyhow::Result<Option<WeatherReport>> {
        let api_key = self
            .weather_api_key
            .as_ref()
            .map(|key| key.expose_secret())
            .ok_or_else(|| anyhow!("OPENWEATHER_API_KEY is not set"))?;

        let response = self
            .http
            .get(&self.weather_url)
            .query(&[("q", city), ("appid", api_key), ("units", "metric")])
            .send()
            .await
            .map_err(|e| e.without_url())?;

        if !response.status().is_success() {
            return Ok(None);
        }

        let data: Value = response.json().await.map_err(|e| e.without_url())?;
        if !is_success_code(&data["cod"]) {
            return Ok(None);
        }

        let temp_c = data["main"]["temp"]
            .as_f64()
            .ok_or_else(|| anyhow!("main.temp missing from response"))?;
        let description = data["weather"][0]["description"]
            .as_str()
            .ok_or_else(|| anyhow!("weather description missing from response"))?;

        Ok(Some(WeatherReport {
            temp_c,
            description: capitalize(description),
        }))
    }

    /// Both feeds, fetched concurrently
    pub async fn snapshot(&self, city: &str) -> LiveMetrics {
        let (forex, weather) = tokio::join!(self.fetch_forex_rate(), self.fetch_weather(city));
        LiveMetrics {
            city: city.to_string(),
            forex,
            weather,
        }
    }
}

fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// OpenWeather reports `cod` as a number on success and a string on errors
fn is_success_code(cod: &Value) -> bool {
    match cod {
        Value::Number(n) => n.as_u64() == Some(200),
        Value::String(s) => s == "200",
        _ => false,
    }
}

/// First character upper-cased, the rest lower-cased
fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Gathers the live metrics snapshot for the requested city
pub struct LiveMetricsTask {
    client: LiveDataClient,
}

impl LiveMetricsTask {
    pub fn new(client: LiveDataClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Task for LiveMetricsTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let city: String = context.require(context_keys::CITY)?;
        info!(%city, "Fetching live forex and weather data");

        let metrics = self.client.snapshot(&city).await;
        let status = format!(
            "Forex {}, weather in {}: {}",
            metrics.forex_display(),
            city,
            metrics.weather_summary()
        );
        context.set(context_keys::METRICS, &metrics)?;

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
    use axum::{Json, Router, extract::Query, http::StatusCode, routing::get};
    use serde_json::json;
    use std::collections::HashMap;

    async fn spawn_server(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    // Nothing listens on port 1
    const DEAD_URL: &str = "http://127.0.0.1:1/unreachable";

    #[tokio::test]
    async fn forex_rate_is_rounded_to_two_decimals() {
        let app = Router::new().route(
            "/price",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params.get("ids").map(String::as_str), Some("usd"));
                assert_eq!(params.get("vs_currencies").map(String::as_str), Some("inr"));
                Json(json!({ "usd": { "inr": 83.4567 } }))
            }),
        );
        let base = spawn_server(app).await;
        let client = LiveDataClient::new(format!("{base}/price"), DEAD_URL, None);

        assert_eq!(client.fetch_forex_rate().await, Ok(83.46));
    }

    #[tokio::test]
    async fn failing_transport_yields_an_error_value() {
        let client = LiveDataClient::new(DEAD_URL, DEAD_URL, Some("key".into()));

        let failure = client.fetch_forex_rate().await.unwrap_err();
        assert!(failure.to_string().contains("Error"));
        assert!(matches!(
            failure,
            FetchFailure::Unavailable {
                feed: LiveFeed::Forex,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unexpected_forex_schema_is_a_failure() {
        let app = Router::new().route(
            "/price",
            get(|| async { Json(json!({ "status": { "error_code": 429 } })) }),
        );
        let base = spawn_server(app).await;
        let client = LiveDataClient::new(format!("{base}/price"), DEAD_URL, None);

        let failure = client.fetch_forex_rate().await.unwrap_err();
        assert!(failure.to_string().starts_with("Error fetching forex rate"));
    }

    #[tokio::test]
    async fn unknown_city_reports_the_city_name() {
        let app = Router::new().route(
            "/weather",
            get(|| async {
                (
                    StatusCode::NOT_FOUND,
                    Json(json!({ "cod": "404", "message": "city not found" })),
                )
            }),
        );
        let base = spawn_server(app).await;
        let client = LiveDataClient::new(DEAD_URL, format!("{base}/weather"), Some("key".into()));

        let failure = client.fetch_weather("Atlantis").await.unwrap_err();
        assert_eq!(
            failure,
            FetchFailure::CityNotFound {
                city: "Atlantis".to_string()
            }
        );
        assert!(failure.to_string().contains("Atlantis"));
    }

    #[tokio::test]
    async fn non_200_code_in_body_counts_as_not_found() {
        let app = Router::new().route(
            "/weather",
            get(|| async { Json(json!({ "cod": "401", "message": "Invalid API key" })) }),
        );
        let base = spawn_server(app).await;
        let client = LiveDataClient::new(DEAD_URL, format!("{base}/weather"), Some("key".into()));

        let failure = client.fetch_weather("Pune").await.unwrap_err();
        assert!(matches!(failure, FetchFailure::CityNotFound { city } if city == "Pune"));
    }

    #[tokio::test]
    async fn weather_report_is_parsed_and_capitalized() {
        let app = Router::new().route(
            "/weather",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params.get("q").map(String::as_str), Some("New Delhi"));
                assert_eq!(params.get("appid").map(String::as_str), Some("key"));
                assert_eq!(params.get("units").map(String::as_str), Some("metric"));
                Json(json!({
                    "cod": 200,
                    "main": { "temp": 31.4 },
                    "weather": [{ "description": "SCATTERED clouds" }]
                }))
            }),
        );
        let base = spawn_server(app).await;
        let client = LiveDataClient::new(DEAD_URL, format!("{base}/weather"), Some("key".into()));

        let report = client.fetch_weather("New Delhi").await.unwrap();
        assert_eq!(report.temp_c, 31.4);
        assert_eq!(report.description, "Scattered clouds");
    }

    #[tokio::test]
    async fn missing_weather_key_is_unavailable_not_not_found() {
        let client = LiveDataClient::new(DEAD_URL, DEAD_URL, None);
        let failure = client.fetch_weather("Chennai").await.unwrap_err();
        assert!(failure.to_string().starts_with("Error fetching weather"));
    }

    #[tokio::test]
    async fn snapshot_never_fails() {
        let client = LiveDataClient::new(DEAD_URL, DEAD_URL, Some("key".into()));
        let metrics = client.snapshot("Chennai").await;
        assert_eq!(metrics.city, "Chennai");
        assert!(metrics.forex.is_err());
        assert!(metrics.weather.is_err());
    }

    #[tokio::test]
    async fn task_stores_metrics_in_context() {
        let task = LiveMetricsTask::new(LiveDataClient::new(DEAD_URL, DEAD_URL, None));
        let context = Context::new();
        context.set(context_keys::CITY, "Chennai").unwrap();

        let result = task.run(context.clone()).await.unwrap();

        assert_eq!(result.next_action, NextAction::Continue);
        let metrics: LiveMetrics = context.require(context_keys::METRICS).unwrap();
        assert_eq!(metrics.city, "Chennai");
    }

    #[test]
    fn capitalize_matches_sentence_case() {
        assert_eq!(capitalize("light RAIN"), "Light rain");
        assert_eq!(capitalize(""), "");
    }
}
