//! Application configuration.

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Backend connection configuration.
    pub backend: BackendConfig,
    /// Object storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Search configuration.
    #[serde(default)]
    pub search: SearchConfig,
    /// Feed configuration.
    #[serde(default)]
    pub feed: FeedConfig,
}

/// Backend connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the hosted backend (auth, REST and storage share it).
    pub url: String,
    /// Publishable (anonymous) API key sent with every request.
    pub anon_key: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

/// Object storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Bucket holding post images.
    #[serde(default = "default_image_bucket")]
    pub image_bucket: String,
    /// Bucket holding post videos.
    #[serde(default = "default_video_bucket")]
    pub video_bucket: String,
    /// Bucket holding profile avatars.
    #[serde(default = "default_avatar_bucket")]
    pub avatar_bucket: String,
    /// Upload size ceiling in bytes; buckets are provisioned with the same
    /// limit.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    /// Asset served in place of unresolvable media paths.
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
}

/// Search configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    /// Quiet window after the last keystroke before a query is issued.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Maximum results per entity kind.
    #[serde(default = "default_result_limit")]
    pub result_limit: u64,
}

/// Feed configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Posts per feed page.
    #[serde(default = "default_page_size")]
    pub page_size: u64,
}

const fn default_request_timeout() -> u64 {
    30
}

const fn default_connect_timeout() -> u64 {
    10
}

fn default_image_bucket() -> String {
    "images".to_string()
}

fn default_video_bucket() -> String {
    "videos".to_string()
}

fn default_avatar_bucket() -> String {
    "avatars".to_string()
}

/// 10 MiB, matching the provisioned bucket ceiling.
const fn default_max_upload_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_placeholder() -> String {
    "/placeholder.svg".to_string()
}

const fn default_debounce_ms() -> u64 {
    300
}

const fn default_result_limit() -> u64 {
    20
}

const fn default_page_size() -> u64 {
    20
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            image_bucket: default_image_bucket(),
            video_bucket: default_video_bucket(),
            avatar_bucket: default_avatar_bucket(),
            max_upload_bytes: default_max_upload_bytes(),
            placeholder: default_placeholder(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            result_limit: default_result_limit(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `MURMUR_ENV`)
    /// 3. Environment variables with `MURMUR` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let env = std::env::var("MURMUR_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("MURMUR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
