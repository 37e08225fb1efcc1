//! Layered configuration: defaults, optional TOML file, environment
//! overrides (prefix `SESSION_ENGINE`, `__` separator)

use crate::context::assembler::RequestDefaults;
use crate::middleware::rate_limiter::RateLimitConfig;
use crate::session::inactivity::InactivityConfig;
use crate::upstream::client::UpstreamConfig;
use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub upstream: UpstreamSettings,
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub inactivity: InactivitySettings,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upstream: UpstreamSettings::default(),
            model: ModelSettings::default(),
            inactivity: InactivitySettings::default(),
            rate_limit: RateLimitSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_api_key() -> SecretString {
    SecretString::new(String::new())
}

fn default_timeout_ms() -> u64 {
    60_000
}

// Partially specified sections fill the remaining fields from defaults
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamSettings {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_api_key")]
    pub api_key: SecretString,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: default_api_key(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_model() -> String {
    RequestDefaults::default().model
}

fn default_max_output_tokens() -> u32 {
    RequestDefaults::default().max_output_tokens
}

fn default_temperature() -> f32 {
    RequestDefaults::default().temperature
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelSettings {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_output_tokens: default_max_output_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_warning_ms() -> u64 {
    5 * 60 * 1000
}

fn default_termination_ms() -> u64 {
    10 * 60 * 1000
}

fn default_max_session_ms() -> u64 {
    2 * 60 * 60 * 1000
}

fn default_inactivity_sweep_ms() -> u64 {
    60 * 1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct InactivitySettings {
    #[serde(default = "default_warning_ms")]
    pub warning_ms: u64,
    #[serde(default = "default_termination_ms")]
    pub termination_ms: u64,
    #[serde(default = "default_max_session_ms")]
    pub max_session_ms: u64,
    #[serde(default = "default_inactivity_sweep_ms")]
    pub sweep_interval_ms: u64,
}

impl Default for InactivitySettings {
    fn default() -> Self {
        Self {
            warning_ms: default_warning_ms(),
            termination_ms: default_termination_ms(),
            max_session_ms: default_max_session_ms(),
            sweep_interval_ms: default_inactivity_sweep_ms(),
        }
    }
}

fn default_window_ms() -> u64 {
    RateLimitConfig::default().window.as_millis() as u64
}

fn default_max_requests() -> usize {
    RateLimitConfig::default().max_requests
}

fn default_rate_limit_sweep_ms() -> u64 {
    RateLimitConfig::default().sweep_interval.as_millis() as u64
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
    #[serde(default = "default_rate_limit_sweep_ms")]
    pub sweep_interval_ms: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            max_requests: default_max_requests(),
            sweep_interval_ms: default_rate_limit_sweep_ms(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Load configuration from `config.toml` (optional) and environment
    /// overrides, after loading a `.env` file when present
    pub fn load() -> crate::error::Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("SESSION_ENGINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::EngineError::Configuration(e.to_string()))?;

        let loaded: Config = config
            .try_deserialize()
            .map_err(|e| crate::error::EngineError::Configuration(e.to_string()))?;
        loaded.inactivity_config().validate()?;
        Ok(loaded)
    }

    pub fn upstream_config(&self) -> UpstreamConfig {
        UpstreamConfig {
            api_url: self.upstream.api_url.clone(),
            api_key: self.upstream.api_key.clone(),
            timeout: Duration::from_millis(self.upstream.timeout_ms),
        }
    }

    pub fn request_defaults(&self) -> RequestDefaults {
        RequestDefaults {
            model: self.model.model.clone(),
            max_output_tokens: self.model.max_output_tokens,
            temperature: self.model.temperature,
        }
    }

    pub fn inactivity_config(&self) -> InactivityConfig {
        InactivityConfig {
            warning_delay: Duration::from_millis(self.inactivity.warning_ms),
            termination_delay: Duration::from_millis(self.inactivity.termination_ms),
            max_session_duration: Duration::from_millis(self.inactivity.max_session_ms),
            sweep_interval: Duration::from_millis(self.inactivity.sweep_interval_ms),
        }
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            window: Duration::from_millis(self.rate_limit.window_ms),
            max_requests: self.rate_limit.max_requests,
            sweep_interval: Duration::from_millis(self.rate_limit.sweep_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_consistent() {
        let config = Config::default();
        assert!(config.inactivity_config().validate().is_ok());
        assert_eq!(config.rate_limit.max_requests, 5);
        assert_eq!(config.inactivity.max_session_ms, 2 * 60 * 60 * 1000);
    }

    #[test]
    fn test_partial_section_fills_remaining_fields() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "inactivity": { "warning_ms": 1000 },
            "upstream": { "api_url": "http://localhost:9000" }
        }))
        .unwrap();
        assert_eq!(config.inactivity.warning_ms, 1000);
        assert_eq!(config.inactivity.termination_ms, 10 * 60 * 1000);
        assert_eq!(config.upstream.api_url, "http://localhost:9000");
        assert_eq!(config.upstream.timeout_ms, 60_000);
        assert_eq!(config.rate_limit.max_requests, 5);
    }

    #[test]
    fn test_duration_conversions() {
        let config = Config::default();
        assert_eq!(
            config.inactivity_config().warning_delay,
            Duration::from_secs(300)
        );
        assert_eq!(config.rate_limit_config().window, Duration::from_secs(60));
        assert_eq!(config.upstream_config().timeout, Duration::from_secs(60));
    }
}
