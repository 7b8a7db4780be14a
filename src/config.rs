use std::time::Duration;
use thiserror::Error;

pub const DEMO_KEY: &str = "DEMO_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("GEMINI_API_KEY (or API_KEY) environment variable not set")]
    MissingApiKey,
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub api_base: String,
    pub text_model: String,
    pub image_model: String,
    pub port: u16,
    pub pipeline: PipelineSettings,
}

/// Knobs for a single generation run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub image_concurrency: usize,
    pub qa_delay: Duration,
    /// Step of the cosmetic progress simulator; zero disables it.
    pub progress_tick: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            image_concurrency: 4,
            qa_delay: Duration::from_millis(500),
            progress_tick: Duration::from_millis(1500),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("GEMINI_API_KEY")
            .or_else(|| lookup("API_KEY"))
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let defaults = PipelineSettings::default();
        let image_concurrency = parse_or(&lookup, "IMAGE_CONCURRENCY", defaults.image_concurrency)?.max(1);
        let qa_delay_ms = parse_or(&lookup, "QA_DELAY_MS", defaults.qa_delay.as_millis() as u64)?;
        let tick_ms = parse_or(&lookup, "PROGRESS_TICK_MS", defaults.progress_tick.as_millis() as u64)?;

        Ok(Self {
            api_key,
            api_base: lookup("GEMINI_API_BASE")
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            text_model: lookup("GEMINI_TEXT_MODEL").unwrap_or_else(|| "gemini-2.5-flash".to_string()),
            image_model: lookup("GEMINI_IMAGE_MODEL")
                .unwrap_or_else(|| "gemini-2.5-flash-image-preview".to_string()),
            port: parse_or(&lookup, "PORT", 8080)?,
            pipeline: PipelineSettings {
                image_concurrency,
                qa_delay: Duration::from_millis(qa_delay_ms),
                progress_tick: Duration::from_millis(tick_ms),
            },
        })
    }

    pub fn is_demo(&self) -> bool {
        self.api_key == DEMO_KEY
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}
