use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::core::prompt::DEFAULT_MAX_CORPUS_BYTES;
use crate::services::reasoning::RetryPolicy;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub store: StoreSettings,
    #[serde(default)]
    pub reasoning: ReasoningSettings,
    #[serde(default)]
    pub prompt: PromptSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
    /// Deadline for one search request, including every backend retry
    #[serde(default = "default_request_deadline_secs")]
    pub request_deadline_secs: u64,
}

fn default_request_deadline_secs() -> u64 { 60 }

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    pub url: String,
    pub api_key: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_store_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_table() -> String { "profiles".to_string() }
fn default_store_timeout_secs() -> u64 { 10 }

#[derive(Debug, Clone, Deserialize)]
pub struct ReasoningSettings {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl ReasoningSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempt_timeout: Duration::from_secs(self.timeout_secs),
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

impl Default for ReasoningSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: String::new(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_endpoint() -> String { "https://api.groq.com/openai/v1".to_string() }
fn default_model() -> String { "mixtral-8x7b-32768".to_string() }
fn default_temperature() -> f64 { 0.2 }
fn default_max_tokens() -> u32 { 1000 }
fn default_timeout_secs() -> u64 { 15 }
fn default_max_retries() -> u32 { 2 }
fn default_initial_backoff_ms() -> u64 { 250 }
fn default_max_backoff_ms() -> u64 { 4000 }

#[derive(Debug, Clone, Deserialize)]
pub struct PromptSettings {
    #[serde(default = "default_max_corpus_bytes")]
    pub max_corpus_bytes: usize,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self { max_corpus_bytes: default_max_corpus_bytes() }
    }
}

fn default_max_corpus_bytes() -> usize { DEFAULT_MAX_CORPUS_BYTES }

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheSettings {
    /// Lifetime of a cached corpus snapshot; 0 disables the cache
    #[serde(default)]
    pub snapshot_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with DISCOVERY__)
    /// 5. SUPABASE_URL, SUPABASE_KEY and GROQ_API_KEY
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., DISCOVERY__REASONING__MAX_RETRIES -> reasoning.max_retries
            .add_source(
                Environment::with_prefix("DISCOVERY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings =
            apply_env_overrides(settings, |name| std::env::var(name).ok())?.try_deserialize()?;
        settings.check_deadline()?;
        Ok(settings)
    }

    /// Reject a request deadline that would cut off the configured retries
    pub fn check_deadline(&self) -> Result<(), ConfigError> {
        let worst_case = self.reasoning.retry_policy().worst_case();
        if Duration::from_secs(self.server.request_deadline_secs) <= worst_case {
            return Err(ConfigError::Message(format!(
                "server.request_deadline_secs ({}) must exceed the reasoning retry budget of {:?} \
                 ({} attempts of {}s plus backoff)",
                self.server.request_deadline_secs,
                worst_case,
                self.reasoning.max_retries + 1,
                self.reasoning.timeout_secs
            )));
        }
        Ok(())
    }
}

/// Apply the deployment's plain credential variables on top of the layered config
fn apply_env_overrides<F>(settings: Config, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut builder = Config::builder().add_source(settings);

    for (var, key) in [
        ("SUPABASE_URL", "store.url"),
        ("SUPABASE_KEY", "store.api_key"),
        ("GROQ_API_KEY", "reasoning.api_key"),
    ] {
        if let Some(value) = lookup(var) {
            builder = builder.set_override(key, value)?;
        }
    }

    builder.build()
}
