// Runtime configuration. Every knob has a default so the service can start
// with no environment at all; `from_env` layers overrides on top through
// the `config` crate.

use std::time::Duration;

use ::config::Environment;
use serde::Deserialize;
use thiserror::Error;

use crate::{cache::CacheConfig, circuit_breaker::CircuitBreakerConfig};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8081";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("could not parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("could not load config: {0}")]
    Load(#[from] ::config::ConfigError),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProviderEndpoints {
    pub airasia_base_url: String,
    pub batik_base_url: String,
    pub garuda_base_url: String,
    pub lionair_base_url: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            airasia_base_url: DEFAULT_BASE_URL.to_string(),
            batik_base_url: DEFAULT_BASE_URL.to_string(),
            garuda_base_url: DEFAULT_BASE_URL.to_string(),
            lionair_base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    // Shared deadline for one fan-out, measured from dispatch
    pub timeout_ms: u64,
    // None disables the per-provider breaker
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

impl AggregatorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            circuit_breaker: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub cache_ttl_minutes: u64,
    pub cache_write_timeout_secs: u64,
    pub http_timeout_secs: u64,
    pub aggregator: AggregatorConfig,
    pub endpoints: ProviderEndpoints,
    pub cache: CacheConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cache_ttl_minutes: 15,
            cache_write_timeout_secs: 5,
            http_timeout_secs: 5,
            aggregator: AggregatorConfig::default(),
            endpoints: ProviderEndpoints::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_minutes.saturating_mul(60))
    }

    pub fn cache_write_timeout(&self) -> Duration {
        Duration::from_secs(self.cache_write_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: ServiceConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_environment(Environment::default())
    }

    /// Same as `from_env`, reading overrides from `vars` instead of the
    /// process environment. Keys use the environment variable names.
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let source: ::config::Map<String, String> = vars.into_iter().collect();
        Self::from_environment(Environment::default().source(Some(source)))
    }

    fn from_environment(environment: Environment) -> Result<Self, ConfigError> {
        let defaults = ServiceConfig::default();

        let settings: EnvSettings = ::config::Config::builder()
            .set_default("cache_ttl_minutes", defaults.cache_ttl_minutes)?
            .set_default("http_timeout_secs", defaults.http_timeout_secs)?
            .set_default("cache_write_timeout_secs", defaults.cache_write_timeout_secs)?
            .set_default("provider_timeout_secs", defaults.aggregator.timeout_ms / 1000)?
            .set_default("airasia_base_url", defaults.endpoints.airasia_base_url.clone())?
            .set_default("batik_base_url", defaults.endpoints.batik_base_url.clone())?
            .set_default("garuda_base_url", defaults.endpoints.garuda_base_url.clone())?
            .set_default("lionair_base_url", defaults.endpoints.lionair_base_url.clone())?
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        let config = settings.apply(defaults)?;
        config.validate()?;
        Ok(config)
    }

    /// Reports every problem at once rather than stopping at the first.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.cache_ttl_minutes == 0 {
            problems.push("cache TTL must be positive".to_string());
        }
        if self.cache_ttl_minutes.checked_mul(60).is_none() {
            problems.push(format!("cache TTL of {} minutes is too large", self.cache_ttl_minutes));
        }
        if self.aggregator.timeout_ms == 0 {
            problems.push("provider timeout must be positive".to_string());
        }
        if self.http_timeout_secs == 0 {
            problems.push("http timeout must be positive".to_string());
        }
        if self.cache_write_timeout_secs == 0 {
            problems.push("cache write timeout must be positive".to_string());
        }
        if self.cache.max_size_bytes().is_none() {
            problems.push(format!("cache size of {} MB is too large", self.cache.max_size_mb));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems.join("; ")))
        }
    }
}

// Flat view of the environment; keys are the lower-cased variable names
#[derive(Debug, Deserialize)]
struct EnvSettings {
    cache_ttl_minutes: u64,
    http_timeout_secs: u64,
    cache_write_timeout_secs: u64,
    provider_timeout_secs: u64,
    airasia_base_url: String,
    batik_base_url: String,
    garuda_base_url: String,
    lionair_base_url: String,
}

impl EnvSettings {
    fn apply(self, mut config: ServiceConfig) -> Result<ServiceConfig, ConfigError> {
        config.cache_ttl_minutes = self.cache_ttl_minutes;
        config.http_timeout_secs = self.http_timeout_secs;
        config.cache_write_timeout_secs = self.cache_write_timeout_secs;
        config.aggregator.timeout_ms = self.provider_timeout_secs.checked_mul(1000).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "PROVIDER_TIMEOUT_SECS of {} is too large",
                self.provider_timeout_secs
            ))
        })?;

        let endpoints = &mut config.endpoints;
        for (url, target) in [
            (self.airasia_base_url, &mut endpoints.airasia_base_url),
            (self.batik_base_url, &mut endpoints.batik_base_url),
            (self.garuda_base_url, &mut endpoints.garuda_base_url),
            (self.lionair_base_url, &mut endpoints.lionair_base_url),
        ] {
            let url = url.trim();
            if !url.is_empty() {
                *target = url.to_string();
            }
        }

        Ok(config)
    }
}
