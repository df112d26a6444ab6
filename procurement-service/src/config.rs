//! Service configuration, read from the environment (and `.env`, loaded by
//! the binary before [`ServiceConfig::from_env`] runs).

use std::path::PathBuf;
use std::str::FromStr;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::tasks::live_data::{FOREX_ENDPOINT, WEATHER_ENDPOINT};
use crate::tasks::notifier::TELEGRAM_ENDPOINT;
use crate::tasks::recommendation::DEFAULT_TOP_K;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_CITY: &str = "Chennai";
pub const DEFAULT_PORT: u16 = 3000;

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub gemini_api_key: SecretString,
    pub gemini_model: String,
    pub openweather_api_key: Option<SecretString>,
    /// Present only when both the bot token and the chat id are set
    pub telegram: Option<TelegramConfig>,
    pub policy_pdf_path: PathBuf,
    pub embedding_model_dir: PathBuf,
    pub retrieval_top_k: usize,
    pub default_city: String,
    pub forex_api_url: String,
    pub weather_api_url: String,
    pub preload_policy_index: bool,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub api_url: String,
    pub bot_token: SecretString,
    pub chat_id: String,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let gemini_api_key = get("GEMINI_API_KEY")
            .map(SecretString::from)
            .ok_or(ConfigError::Missing("GEMINI_API_KEY"))?;

        let telegram = match (get("TELEGRAM_BOT_TOKEN"), get("TELEGRAM_CHAT_ID")) {
            (Some(bot_token), Some(chat_id)) => Some(TelegramConfig {
                api_url: get("TELEGRAM_API_URL").unwrap_or_else(|| TELEGRAM_ENDPOINT.to_string()),
                bot_token: SecretString::from(bot_token),
                chat_id,
            }),
            _ => None,
        };

        Ok(Self {
            gemini_api_key,
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            openweather_api_key: get("OPENWEATHER_API_KEY").map(SecretString::from),
            telegram,
            policy_pdf_path: get("POLICY_PDF_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("PROCUREMENT_POLICY.pdf")),
            embedding_model_dir: get("EMBEDDING_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("models")),
            retrieval_top_k: parse_or("RETRIEVAL_TOP_K", get("RETRIEVAL_TOP_K"), DEFAULT_TOP_K)?,
            default_city: get("DEFAULT_CITY").unwrap_or_else(|| DEFAULT_CITY.to_string()),
            forex_api_url: get("FOREX_API_URL").unwrap_or_else(|| FOREX_ENDPOINT.to_string()),
            weather_api_url: get("WEATHER_API_URL").unwrap_or_else(|| WEATHER_ENDPOINT.to_string()),
            preload_policy_index: parse_flag("PRELOAD_POLICY_INDEX", get("PRELOAD_POLICY_INDEX"), true)?,
            port: parse_or("PORT", get("PORT"), DEFAULT_PORT)?,
        })
    }
}

fn parse_or<T>(key: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn parse_flag(key: &'static str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = value else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw,
            reason: "expected true or false".to_string(),
        }),
    }
}
