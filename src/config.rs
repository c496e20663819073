//! Configuration management for AutoLabel.
//!
//! Loads configuration from environment variables (and an optional `.env`
//! file) with support for:
//! - Server bind address and optional API token
//! - SQLite database and upload storage locations
//! - Multiple inference providers with fallback priority

use std::env;
use std::sync::OnceLock;

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration
pub fn config() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Initialize configuration (call once at startup)
pub fn init() -> &'static Config {
    config()
}

/// Default image extensions accepted for upload.
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif"];

/// Default zero-shot model.
pub const DEFAULT_CLIP_MODEL: &str = "openai/clip-vit-base-patch32";

/// Default prompt used to turn a label into a text hypothesis.
pub const DEFAULT_HYPOTHESIS_TEMPLATE: &str = "a photo of a {}";

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub inference: InferenceConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// When set, all routes except `/health` require this bearer token.
    pub api_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub uploads_path: String,
    pub max_upload_size: usize,
    pub allowed_extensions: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_path: "./data/uploads".to_string(),
            max_upload_size: 10 * 1024 * 1024,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub providers: Vec<InferenceProvider>,
    pub hypothesis_template: String,
    pub timeout_secs: u64,
    /// Maximum inference calls in flight for a single upload request.
    pub concurrency_limit: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            hypothesis_template: DEFAULT_HYPOTHESIS_TEMPLATE.to_string(),
            timeout_secs: 60,
            concurrency_limit: 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InferenceProvider {
    pub name: String,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub priority: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            server: ServerConfig {
                host: env_or("HOST", "0.0.0.0"),
                port: env_or("PORT", "5000").parse().unwrap_or(5000),
                api_token: env::var("API_TOKEN").ok().filter(|t| !t.is_empty()),
            },
            database: DatabaseConfig {
                path: env_or("DATABASE_PATH", "./data/autolabel.db"),
            },
            storage: StorageConfig {
                uploads_path: env_or("UPLOADS_PATH", "./data/uploads"),
                max_upload_size: env_or("MAX_UPLOAD_SIZE", "10485760")
                    .parse()
                    .unwrap_or(10 * 1024 * 1024), // 10MB
                allowed_extensions: env::var("ALLOWED_EXTENSIONS")
                    .map(|v| parse_extensions(&v))
                    .unwrap_or_else(|_| StorageConfig::default().allowed_extensions),
            },
            inference: InferenceConfig {
                providers: Self::parse_inference_providers(),
                hypothesis_template: env_or("HYPOTHESIS_TEMPLATE", DEFAULT_HYPOTHESIS_TEMPLATE),
                timeout_secs: env_or("INFERENCE_TIMEOUT_SECS", "60").parse().unwrap_or(60),
                concurrency_limit: env_or("INFERENCE_CONCURRENCY", "4")
                    .parse()
                    .ok()
                    .filter(|n| *n > 0)
                    .unwrap_or(4),
            },
            logging: LoggingConfig {
                format: env_or("LOG_FORMAT", "pretty")
                    .parse()
                    .unwrap_or(LogFormat::Pretty),
            },
        }
    }

    /// Parse inference providers from environment.
    /// A self-hosted endpoint is preferred over the hosted Hugging Face API.
    fn parse_inference_providers() -> Vec<InferenceProvider> {
        let mut providers = Vec::new();
        let model = env_or("CLIP_MODEL", DEFAULT_CLIP_MODEL);

        // Self-hosted (priority 1)
        if let Ok(base_url) = env::var("INFERENCE_URL") {
            providers.push(InferenceProvider {
                name: "self-hosted".to_string(),
                base_url: base_url.trim_end_matches('/').to_string(),
                model: model.clone(),
                api_key: env::var("INFERENCE_API_KEY").ok(),
                priority: 1,
            });
        }

        // Hugging Face Inference API (priority 2)
        if let Ok(api_key) = env::var("HF_API_TOKEN") {
            providers.push(InferenceProvider {
                name: "huggingface".to_string(),
                base_url: env_or("HF_INFERENCE_URL", "https://api-inference.huggingface.co"),
                model,
                api_key: Some(api_key),
                priority: 2,
            });
        }

        // Sort by priority
        providers.sort_by_key(|p| p.priority);
        providers
    }
}

/// Split a comma-separated extension list, normalizing case and leading dots.
pub fn parse_extensions(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
