//! Application settings and configuration management

use crate::error::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub server: ServerConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    pub gemini: GeminiConfig,
    pub rate_limit: RateLimitConfig,
    pub upload: UploadConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Secret encryption configuration
#[derive(Clone, Default, Deserialize, Serialize)]
pub struct SecurityConfig {
    /// 32-byte key as 64 hex characters (`openssl rand -hex 32`)
    #[serde(default)]
    pub encryption_key: Option<String>,
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("encryption_key", &self.encryption_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Upstream Gemini image API configuration
#[derive(Clone, Deserialize, Serialize)]
pub struct GeminiConfig {
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    #[serde(default = "default_gemini_model")]
    pub model: String,
    /// Server-side fallback credential
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("max_retries", &self.max_retries)
            .field("initial_delay_ms", &self.initial_delay_ms)
            .field("timeout_ms", &self.timeout_ms)
            .finish_non_exhaustive()
    }
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta/models".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash-image-preview".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_timeout() -> u64 {
    120000
}

fn default_temperature() -> f32 {
    0.3
}

fn default_top_p() -> f32 {
    0.9
}

fn default_top_k() -> u32 {
    40
}

/// One rate-limit budget
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct RateLimitRule {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl RateLimitRule {
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Rate limiting configuration, one rule per endpoint class
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_generation_rule")]
    pub generation: RateLimitRule,
    #[serde(default = "default_upload_rule")]
    pub upload: RateLimitRule,
    #[serde(default = "default_api_key_rule")]
    pub api_key: RateLimitRule,
    #[serde(default = "default_general_rule")]
    pub general: RateLimitRule,
}

fn default_true() -> bool {
    true
}

fn default_generation_rule() -> RateLimitRule {
    RateLimitRule::new(10, 60)
}

fn default_upload_rule() -> RateLimitRule {
    RateLimitRule::new(20, 60)
}

fn default_api_key_rule() -> RateLimitRule {
    RateLimitRule::new(5, 60 * 60)
}

fn default_general_rule() -> RateLimitRule {
    RateLimitRule::new(100, 60)
}

/// Upload limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: usize,
}

fn default_max_file_size() -> usize {
    10 * 1024 * 1024
}

/// A bearer session issued by the sign-in provider
#[derive(Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    pub token: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("token", &"<redacted>")
            .field("email", &self.email)
            .field("name", &self.name)
            .finish()
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub sessions: Vec<SessionConfig>,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
}

fn default_storage_backend() -> String {
    "sqlite".to_string()
}

fn default_sqlite_path() -> String {
    "./db/muse-studio.db".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Settings {
    /// Load settings from configuration files and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/default.toml")
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            // Start with default values
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .set_default("gemini.base_url", default_gemini_base_url())?
            .set_default("gemini.model", default_gemini_model())?
            .set_default("rate_limit.enabled", true)?
            .set_default("upload.max_file_size_bytes", default_max_file_size() as u64)?
            .set_default("storage.backend", default_storage_backend())?
            .set_default("storage.sqlite_path", default_sqlite_path())?
            .set_default("logging.level", default_log_level())?
            .set_default("logging.format", default_log_format())?
            // Load from configuration file
            .add_source(
                File::with_name(path.as_ref().to_str().unwrap_or("config/default"))
                    .required(false),
            )
            // Override with environment variables (prefixed with MUSE_STUDIO__)
            .add_source(
                Environment::with_prefix("MUSE_STUDIO")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(invalid("Server port cannot be 0"));
        }

        if let Some(key) = &self.security.encryption_key {
            if key.len() != 64 || !key.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(invalid(
                    "security.encryption_key must be a 32-byte hex string (use `openssl rand -hex 32`)",
                ));
            }
        }

        for (class, rule) in [
            ("generation", self.rate_limit.generation),
            ("upload", self.rate_limit.upload),
            ("api_key", self.rate_limit.api_key),
            ("general", self.rate_limit.general),
        ] {
            if rule.max_requests == 0 || rule.window_secs == 0 {
                return Err(invalid(format!(
                    "Rate limit class '{}' needs non-zero max_requests and window_secs",
                    class
                )));
            }
        }

        if self.upload.max_file_size_bytes == 0 {
            return Err(invalid("upload.max_file_size_bytes cannot be 0"));
        }

        if !["memory", "sqlite"].contains(&self.storage.backend.as_str()) {
            return Err(invalid(format!(
                "Storage backend '{}' is invalid. Must be 'memory' or 'sqlite'",
                self.storage.backend
            )));
        }

        for session in &self.auth.sessions {
            if session.token.is_empty() || session.email.is_empty() {
                return Err(invalid("Auth sessions need a token and an email"));
            }
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> AppError {
    AppError::Config(config::ConfigError::Message(message.into()))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
            },
            security: SecurityConfig::default(),
            gemini: GeminiConfig {
                base_url: default_gemini_base_url(),
                model: default_gemini_model(),
                api_key: None,
                max_retries: default_max_retries(),
                initial_delay_ms: default_initial_delay_ms(),
                timeout_ms: default_timeout(),
                temperature: default_temperature(),
                top_p: default_top_p(),
                top_k: default_top_k(),
            },
            rate_limit: RateLimitConfig {
                enabled: true,
                generation: default_generation_rule(),
                upload: default_upload_rule(),
                api_key: default_api_key_rule(),
                general: default_general_rule(),
            },
            upload: UploadConfig {
                max_file_size_bytes: default_max_file_size(),
            },
            auth: AuthConfig::default(),
            storage: StorageConfig {
                backend: default_storage_backend(),
                sqlite_path: default_sqlite_path(),
            },
            logging: LoggingConfig {
                level: default_log_level(),
                format: default_log_format(),
            },
        }
    }
}
