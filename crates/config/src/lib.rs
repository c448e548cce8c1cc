//! Configuration loading, validation, and management for Disha.
//!
//! Loads configuration from `~/.disha/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.disha/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// LLM provider settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Token budgeting for the context window
    #[serde(default)]
    pub context: ContextConfig,

    /// Long-term memory extraction and retrieval
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Protocol injection
    #[serde(default)]
    pub protocols: ProtocolsConfig,

    /// Persistence
    #[serde(default)]
    pub database: DatabaseConfig,

    /// HTTP gateway
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Which LLM backend answers chat turns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(alias = "open_ai")]
    OpenAi,
    Anthropic,
    /// Offline canned replies, no API key needed
    #[default]
    Demo,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Demo => "demo",
        }
    }

    /// Model used when none is configured.
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4o-mini",
            ProviderKind::Anthropic => "claude-3-5-sonnet-20241022",
            ProviderKind::Demo => "demo",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(ProviderKind::OpenAi),
            "anthropic" => Ok(ProviderKind::Anthropic),
            "demo" => Ok(ProviderKind::Demo),
            other => Err(ConfigError::ValidationError(format!(
                "unknown provider '{other}' (expected openai, anthropic or demo)"
            ))),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,

    /// Falls back to the provider's default model when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Override the provider's base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Upper bound on a single completion call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_temperature() -> f32 {
    0.7
}
fn default_timeout_secs() -> u64 {
    60
}

impl ProviderConfig {
    /// The configured model, or the provider's default.
    pub fn model_name(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.kind.default_model().to_string())
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            model: None,
            api_key: None,
            api_url: None,
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Total token budget for one request (prompt + reply)
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,

    /// Tokens reserved for the reply; also sent as `max_tokens`
    #[serde(default = "default_max_response_tokens")]
    pub max_response_tokens: usize,

    /// How many recent messages are loaded before budgeting
    #[serde(default = "default_history_fetch_limit")]
    pub history_fetch_limit: usize,
}

fn default_max_context_tokens() -> usize {
    8000
}
fn default_max_response_tokens() -> usize {
    1000
}
fn default_history_fetch_limit() -> usize {
    20
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: default_max_context_tokens(),
            max_response_tokens: default_max_response_tokens(),
            history_fetch_limit: default_history_fetch_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Extract after every Nth message in a user's log
    #[serde(default = "default_extraction_interval")]
    pub extraction_interval: usize,

    /// Number of recent messages shown to the extractor
    #[serde(default = "default_extraction_window")]
    pub extraction_window: usize,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Memories below this importance are never injected
    #[serde(default = "default_min_importance")]
    pub min_importance: u8,

    /// Run extraction in a spawned task instead of before the reply returns
    #[serde(default = "default_true")]
    pub background_extraction: bool,
}

fn default_extraction_interval() -> usize {
    5
}
fn default_extraction_window() -> usize {
    10
}
fn default_top_k() -> usize {
    5
}
fn default_min_importance() -> u8 {
    3
}
fn default_true() -> bool {
    true
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            extraction_interval: default_extraction_interval(),
            extraction_window: default_extraction_window(),
            top_k: default_top_k(),
            min_importance: default_min_importance(),
            background_extraction: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolsConfig {
    /// Cap on matched protocols rendered into one prompt
    #[serde(default = "default_max_injected")]
    pub max_injected: usize,

    /// Seed the built-in protocols when the server starts
    #[serde(default = "default_true")]
    pub seed_on_start: bool,
}

fn default_max_injected() -> usize {
    3
}

impl Default for ProtocolsConfig {
    fn default() -> Self {
        Self {
            max_injected: default_max_injected(),
            seed_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
}

fn default_database_url() -> String {
    "sqlite://disha.db".into()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Default page size for message history
    #[serde(default = "default_messages_per_page")]
    pub messages_per_page: usize,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_messages_per_page() -> usize {
    50
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            messages_per_page: default_messages_per_page(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.disha/config.toml),
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from `path`, apply environment overrides, and validate.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    ///
    /// - `DISHA_PROVIDER` (openai | anthropic | demo)
    /// - `DISHA_MODEL`
    /// - `DISHA_API_KEY`, else `OPENAI_API_KEY` / `ANTHROPIC_API_KEY` matching the provider
    /// - `DATABASE_URL`
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(kind) = lookup("DISHA_PROVIDER") {
            self.provider.kind = kind.parse()?;
        }

        if let Some(model) = lookup("DISHA_MODEL") {
            self.provider.model = Some(model);
        }

        if self.provider.api_key.is_none() {
            let vendor_key = match self.provider.kind {
                ProviderKind::OpenAi => lookup("OPENAI_API_KEY"),
                ProviderKind::Anthropic => lookup("ANTHROPIC_API_KEY"),
                ProviderKind::Demo => None,
            };
            self.provider.api_key = lookup("DISHA_API_KEY").or(vendor_key);
        }

        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = url;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".disha")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.provider.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "provider.timeout_secs must be > 0".into(),
            ));
        }

        if self.context.max_response_tokens >= self.context.max_context_tokens {
            return Err(ConfigError::ValidationError(
                "context.max_response_tokens must be smaller than context.max_context_tokens"
                    .into(),
            ));
        }

        if self.memory.extraction_interval == 0 {
            return Err(ConfigError::ValidationError(
                "memory.extraction_interval must be > 0".into(),
            ));
        }

        if !(1..=5).contains(&self.memory.min_importance) {
            return Err(ConfigError::ValidationError(
                "memory.min_importance must be between 1 and 5".into(),
            ));
        }

        if self.gateway.messages_per_page == 0 || self.gateway.messages_per_page > 100 {
            return Err(ConfigError::ValidationError(
                "gateway.messages_per_page must be between 1 and 100".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
