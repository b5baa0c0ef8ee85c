use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::session::SessionConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub nats: NatsConfig,
    #[serde(default)]
    pub session: SessionDefaults,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct NatsConfig {
    pub url: String,
}

/// Defaults applied to every new session
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionDefaults {
    pub locale: String,
    pub enable_partial_results: bool,
    pub continuous: bool,
    pub max_silence_ms: u64,
    pub restart_delay_ms: u64,
    pub max_result_candidates: u32,
    pub language_model: Option<String>,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            locale: session.locale,
            enable_partial_results: session.enable_partial_results,
            continuous: session.continuous,
            max_silence_ms: session.max_silence_duration.as_millis() as u64,
            restart_delay_ms: session.restart_delay.as_millis() as u64,
            max_result_candidates: session.max_result_candidates,
            language_model: session.language_model,
        }
    }
}

impl From<&SessionDefaults> for SessionConfig {
    fn from(defaults: &SessionDefaults) -> Self {
        Self {
            locale: defaults.locale.clone(),
            enable_partial_results: defaults.enable_partial_results,
            continuous: defaults.continuous,
            max_silence_duration: Duration::from_millis(defaults.max_silence_ms),
            restart_delay: Duration::from_millis(defaults.restart_delay_ms),
            max_result_candidates: defaults.max_result_candidates,
            language_model: defaults.language_model.clone(),
            ..SessionConfig::default()
        }
    }
}

impl Config {
    /// Load `path`, then apply `VOICE_SESSION__SECTION__KEY` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("VOICE_SESSION")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to load config from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }
}
