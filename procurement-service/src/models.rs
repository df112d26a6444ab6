use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which live data source a failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveFeed {
    Forex,
    Weather,
}

impl fmt::Display for LiveFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiveFeed::Forex => f.write_str("forex rate"),
            LiveFeed::Weather => f.write_str("weather"),
        }
    }
}

/// Why a live value could not be obtained. Carried as data in the metrics
/// snapshot; a failed fetch never aborts an analysis.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchFailure {
    #[error("City not found: {city}")]
    CityNotFound { city: String },

    #[error("Error fetching {feed}: {reason}")]
    Unavailable { feed: LiveFeed, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub temp_c: f64,
    pub description: String,
}

/// Best-effort live data gathered for one analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveMetrics {
    pub city: String,
    pub forex: Result<f64, FetchFailure>,
    pub weather: Result<WeatherReport, FetchFailure>,
}

impl LiveMetrics {
    /// The USD→INR rate, or the failure text in its place
    pub fn forex_display(&self) -> String {
        match &self.forex {
            Ok(rate) => rate.to_string(),
            Err(failure) => failure.to_string(),
        }
    }

    pub fn temperature_display(&self) -> String {
        match &self.weather {
            Ok(report) => format!("{}°C", report.temp_c),
            Err(_) => "n/a".to_string(),
        }
    }

    pub fn weather_description(&self) -> String {
        match &self.weather {
            Ok(report) => report.description.clone(),
            Err(failure) => failure.to_string(),
        }
    }

    /// One-line weather status used in the recommendation prompt
    pub fn weather_summary(&self) -> String {
        format!(
            "{}, {}",
            self.weather_description(),
            self.temperature_display()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Unknown,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
            RiskLevel::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

/// Coarse action recommendation derived from the risk level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "PROCEED")]
    Proceed,
    #[serde(rename = "NEED REVIEW")]
    NeedReview,
    #[serde(rename = "REJECTED")]
    Rejected,
    #[serde(rename = "REVIEW")]
    Review,
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Proceed => "PROCEED",
            Verdict::NeedReview => "NEED REVIEW",
            Verdict::Rejected => "REJECTED",
            Verdict::Review => "REVIEW",
        }
    }

    /// Label with the status glyph shown in the decision panel
    pub fn badge(&self) -> String {
        match self {
            Verdict::Proceed => format!("✅ {}", self.label()),
            Verdict::NeedReview => format!("⚠️ {}", self.label()),
            Verdict::Rejected => format!("❌ {}", self.label()),
            Verdict::Review => self.label().to_string(),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub risk_level: RiskLevel,
    pub verdict: Verdict,
    /// CSS colour of the decision panel heading
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NotificationStatus {
    /// Delivery ran; `chunks` messages were posted without checking receipt
    Delivered { chunks: usize },
    Skipped { reason: String },
}

/// Everything one run of the pipeline produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcurementAnalysis {
    pub analysis_id: String,
    pub request: String,
    pub city: String,
    pub metrics: LiveMetrics,
    pub policy_summary: String,
    pub recommendation: String,
    pub decision: Decision,
    pub notification: NotificationStatus,
    pub generated_at: DateTime<FixedOffset>,
    pub steps: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub request: String,
    #[serde(default)]
    pub city: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AnalyzeForm {
    #[serde(default)]
    pub request: String,
    #[serde(default)]
    pub city: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(
        forex: Result<f64, FetchFailure>,
        weather: Result<WeatherReport, FetchFailure>,
    ) -> LiveMetrics {
        LiveMetrics {
            city: "Chennai".to_string(),
            forex,
            weather,
        }
    }

    #[test]
    fn displays_available_values() {
        let m = metrics(
            Ok(83.12),
            Ok(WeatherReport {
                temp_c: 31.5,
                description: "Haze".to_string(),
            }),
        );
        assert_eq!(m.forex_display(), "83.12");
        assert_eq!(m.weather_summary(), "Haze, 31.5°C");
    }

    #[test]
    fn failures_render_in_place_of_values() {
        let m = metrics(
            Err(FetchFailure::Unavailable {
                feed: LiveFeed::Forex,
                reason: "connection refused".to_string(),
            }),
            Err(FetchFailure::CityNotFound {
                city: "Atlantis".to_string(),
            }),
        );
        assert_eq!(
            m.forex_display(),
            "Error fetching forex rate: connection refused"
        );
        assert_eq!(m.weather_summary(), "City not found: Atlantis, n/a");
    }

    #[test]
    fn verdicts_serialize_with_their_labels() {
        let json = serde_json::to_string(&Verdict::NeedReview).unwrap();
        assert_eq!(json, "\"NEED REVIEW\"");
        assert_eq!(Verdict::Rejected.badge(), "❌ REJECTED");
        assert_eq!(Verdict::Review.badge(), "REVIEW");
    }

    #[test]
    fn metrics_survive_a_json_round_trip() {
        let m = metrics(
            Ok(83.0),
            Err(FetchFailure::CityNotFound {
                city: "Nowhere".to_string(),
            }),
        );
        let value = serde_json::to_value(&m).unwrap();
        let back: LiveMetrics = serde_json::from_value(value).unwrap();
        assert_eq!(back, m);
    }
}
