use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_SERVICE_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_ASSISTANT_MODEL: &str = "openai/gpt-4o-mini";
pub const DEFAULT_SHIPMENTS_TIMEOUT_MS: u64 = 2_500;
pub const DEFAULT_ASSISTANT_TIMEOUT_MS: u64 = 4_500;
pub const DEFAULT_VERIFICATION_PHRASE: &str =
    "Навык работает. Назовите код из мини\u{2011}приложения, чтобы привязать аккаунт.";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for `{key}`: `{value}` is not a number")]
    InvalidNumber { key: &'static str, value: String },
    #[error("invalid value for `{key}`: `{value}`")]
    InvalidValue { key: &'static str, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

/// Which key-value backend holds pairings and bindings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KvBackend {
    /// The external store behind the HTTP pipeline protocol
    Pipeline,
    /// Process-local map; bindings do not survive a restart
    Memory,
}

#[derive(Clone, Debug)]
pub struct KvConfig {
    pub backend: KvBackend,
    pub rest_url: Option<String>,
    pub rest_token: Option<String>,
}

#[derive(Clone, Debug)]
pub struct DownstreamConfig {
    pub base_url: String,
    pub shipments_budget: Duration,
    pub assistant_budget: Duration,
    pub assistant_model: String,
}

/// Process-wide settings, built once at startup
#[derive(Clone, Debug)]
pub struct SkillConfig {
    pub port: u16,
    pub kv: KvConfig,
    pub downstream: DownstreamConfig,
    pub verification_phrase: String,
}

impl Default for SkillConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            kv: KvConfig {
                backend: KvBackend::Pipeline,
                rest_url: None,
                rest_token: None,
            },
            downstream: DownstreamConfig {
                base_url: DEFAULT_SERVICE_BASE_URL.to_string(),
                shipments_budget: Duration::from_millis(DEFAULT_SHIPMENTS_TIMEOUT_MS),
                assistant_budget: Duration::from_millis(DEFAULT_ASSISTANT_TIMEOUT_MS),
                assistant_model: DEFAULT_ASSISTANT_MODEL.to_string(),
            },
            verification_phrase: DEFAULT_VERIFICATION_PHRASE.to_string(),
        }
    }
}

impl SkillConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();

        if let Some(port) = var("PORT") {
            config.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidNumber { key: "PORT", value: port })?;
        }

        config.kv.rest_url = var("KV_REST_URL").map(|url| url.trim_end_matches('/').to_string());
        config.kv.rest_token = var("KV_REST_TOKEN");
        if let Some(backend) = var("KV_BACKEND") {
            config.kv.backend = match backend.to_ascii_lowercase().as_str() {
                "pipeline" => KvBackend::Pipeline,
                "memory" => KvBackend::Memory,
                _ => {
                    return Err(ConfigError::InvalidValue { key: "KV_BACKEND", value: backend });
                }
            };
        }

        if let Some(base_url) = var("SERVICE_BASE_URL") {
            config.downstream.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(model) = var("ASSISTANT_MODEL") {
            config.downstream.assistant_model = model;
        }
        if let Some(ms) = var("SHIPMENTS_TIMEOUT_MS") {
            config.downstream.shipments_budget = parse_millis("SHIPMENTS_TIMEOUT_MS", ms)?;
        }
        if let Some(ms) = var("ASSISTANT_TIMEOUT_MS") {
            config.downstream.assistant_budget = parse_millis("ASSISTANT_TIMEOUT_MS", ms)?;
        }
        if let Some(phrase) = var("VERIFICATION_PHRASE") {
            config.verification_phrase = phrase;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let downstream = &self.downstream;
        if downstream.shipments_budget.is_zero() {
            return Err(ConfigError::Validation(
                "shipment-list budget must be positive".to_string(),
            ));
        }
        if downstream.shipments_budget >= downstream.assistant_budget {
            return Err(ConfigError::Validation(format!(
                "shipment-list budget ({} ms) must be shorter than the assistant budget ({} ms)",
                downstream.shipments_budget.as_millis(),
                downstream.assistant_budget.as_millis()
            )));
        }
        Ok(())
    }
}

fn parse_millis(key: &'static str, value: String) -> Result<Duration, ConfigError> {
    value
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::InvalidNumber { key, value })
}
