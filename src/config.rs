//! Configuration types for media-relay

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use utoipa::ToSchema;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Main configuration for [`MediaRelay`](crate::MediaRelay)
///
/// Every sub-config has sensible defaults, so `Config::default()` is a working
/// local setup with no chat delivery. [`Config::from_env`] layers the process
/// environment on top.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Artifact directory and retention
    #[serde(default)]
    pub storage: StorageConfig,

    /// Media extractor (yt-dlp) settings
    #[serde(default)]
    pub extractor: ExtractorConfig,

    /// Size limits, chunking and upload timeouts
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Chat platform credentials and destinations
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// REST API server
    #[serde(default)]
    pub api: ApiConfig,
}

/// Artifact directory and retention policy
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct StorageConfig {
    /// Directory holding artifacts, parts and zips (default: "downloads")
    #[serde(default = "default_downloads_dir")]
    #[schema(value_type = String)]
    pub downloads_dir: PathBuf,

    /// Files older than this many days are swept (default: 3)
    #[serde(default = "default_file_validity_days")]
    pub file_validity_days: u64,

    /// How often the age-based sweep runs (default: 1 hour)
    #[serde(default = "default_sweep_interval", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub sweep_interval: Duration,

    /// Remove every file in the directory before a new job starts (default: true)
    #[serde(default = "default_true")]
    pub clear_before_new_job: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            downloads_dir: default_downloads_dir(),
            file_validity_days: default_file_validity_days(),
            sweep_interval: default_sweep_interval(),
            clear_before_new_job: true,
        }
    }
}

/// External extractor settings
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ExtractorConfig {
    /// Explicit path to the yt-dlp binary
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub ytdlp_path: Option<PathBuf>,

    /// Search PATH for yt-dlp when no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// User-Agent sent to media hosts
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Whole-request retries (default: 10)
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Per-fragment retries (default: 10)
    #[serde(default = "default_retries")]
    pub fragment_retries: u32,

    /// Upper bound for metadata probes (default: 120 seconds)
    #[serde(default = "default_probe_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub probe_timeout: Duration,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: None,
            search_path: true,
            user_agent: default_user_agent(),
            retries: default_retries(),
            fragment_retries: default_retries(),
            probe_timeout: default_probe_timeout(),
        }
    }
}

/// Delivery limits and timing
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DeliveryConfig {
    /// Largest file the direct (bot) channel accepts (default: 50 MiB)
    #[serde(default = "default_small_limit")]
    pub small_limit: u64,

    /// Absolute single-file ceiling of the large-payload channel (default: 2000 MiB)
    #[serde(default = "default_large_limit")]
    pub large_limit: u64,

    /// Part size for split uploads, must stay below `large_limit` (default: 1.95 GiB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Largest artifact that will be split at all (default: 16 GiB)
    #[serde(default = "default_max_split_total")]
    pub max_split_total: u64,

    /// Upload timeout floor (default: 300 seconds)
    #[serde(default = "default_base_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub base_timeout: Duration,

    /// Extra timeout per started 100 MB (default: 60 seconds)
    #[serde(default = "default_timeout_step", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub timeout_step: Duration,

    /// Upload timeout ceiling (default: 1800 seconds)
    #[serde(default = "default_max_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub max_timeout: Duration,

    /// Minimum gap between time-based progress notifications (default: 5 seconds)
    #[serde(default = "default_notify_interval", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub notify_interval: Duration,

    /// Pause between consecutive part uploads (default: 1 second)
    #[serde(default = "default_pause_between_parts", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub pause_between_parts: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            small_limit: default_small_limit(),
            large_limit: default_large_limit(),
            chunk_size: default_chunk_size(),
            max_split_total: default_max_split_total(),
            base_timeout: default_base_timeout(),
            timeout_step: default_timeout_step(),
            max_timeout: default_max_timeout(),
            notify_interval: default_notify_interval(),
            pause_between_parts: default_pause_between_parts(),
        }
    }
}

impl DeliveryConfig {
    /// Upload budget for a file of `size` bytes
    ///
    /// `min(base + step * floor(size / 100 MB), max)`
    pub fn upload_timeout(&self, size: u64) -> Duration {
        let steps = u32::try_from(size / (100 * MIB)).unwrap_or(u32::MAX);
        let scaled = self
            .base_timeout
            .saturating_add(self.timeout_step.saturating_mul(steps));
        scaled.min(self.max_timeout)
    }
}

/// Chat platform settings
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TelegramConfig {
    /// Bot token; without it no chat delivery or bot is available
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Run the chat bot update loop (default: true)
    #[serde(default = "default_true")]
    pub bot_enabled: bool,

    /// Destination channel (`-100...` or `@name`) for channel uploads
    #[serde(default)]
    pub channel_id: Option<String>,

    /// Application id for the large-payload server
    #[serde(default)]
    pub api_id: Option<String>,

    /// Application hash for the large-payload server
    #[serde(default)]
    pub api_hash: Option<String>,

    /// Base URL of the self-hosted Bot API server used for large payloads
    #[serde(default)]
    pub large_api_url: Option<String>,

    /// Public Bot API endpoint (default: "https://api.telegram.org")
    #[serde(default = "default_bot_api_url")]
    pub bot_api_url: String,

    /// Public base URL of this service, used to build retrievable links
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// Long-poll timeout for `getUpdates` (default: 30 seconds)
    #[serde(default = "default_poll_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub poll_timeout: Duration,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            bot_enabled: true,
            channel_id: None,
            api_id: None,
            api_hash: None,
            large_api_url: None,
            bot_api_url: default_bot_api_url(),
            public_base_url: default_public_base_url(),
            poll_timeout: default_poll_timeout(),
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 0.0.0.0:8000)
    #[serde(default = "default_bind_address")]
    #[schema(value_type = String)]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

impl Config {
    /// Build a configuration from defaults overlaid with the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    ///
    /// Used by [`Config::from_env`]; tests pass a map instead of touching the
    /// real environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get("DOWNLOADS_DIR") {
            config.storage.downloads_dir = PathBuf::from(dir);
        }
        if let Some(days) = get("FILE_VALIDITY_DAYS") {
            config.storage.file_validity_days = parse_number(&days, "FILE_VALIDITY_DAYS")?;
        }
        if let Some(origins) = get("CORS_ORIGINS") {
            config.api.cors_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }

        let host = get("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = match get("API_PORT") {
            Some(port) => parse_number(&port, "API_PORT")?,
            None => 8000,
        };
        config.api.bind_address = format!("{host}:{port}")
            .parse()
            .map_err(|e| Error::Config {
                message: format!("invalid API_HOST/API_PORT: {e}"),
                key: Some("API_HOST".to_string()),
            })?;

        // Links must be reachable from outside, so a wildcard bind becomes localhost
        let public_host = if host == "0.0.0.0" {
            "localhost".to_string()
        } else {
            host
        };
        config.telegram.public_base_url = get("TELEGRAM_API_BASE_URL")
            .unwrap_or_else(|| format!("http://{public_host}:{port}"));

        config.telegram.bot_token = get("TELEGRAM_BOT_TOKEN");
        if let Some(enabled) = get("TELEGRAM_BOT_ENABLED") {
            config.telegram.bot_enabled = enabled.eq_ignore_ascii_case("true");
        }
        config.telegram.channel_id = get("TELEGRAM_CHANNEL_ID");
        config.telegram.api_id = get("TELEGRAM_API_ID");
        config.telegram.api_hash = get("TELEGRAM_API_HASH");
        config.telegram.large_api_url = get("TELEGRAM_LARGE_API_URL");

        config.validate()?;
        Ok(config)
    }

    /// Reject limit combinations the delivery pipeline cannot honour
    pub fn validate(&self) -> Result<()> {
        let d = &self.delivery;
        if d.small_limit == 0 || d.large_limit == 0 || d.chunk_size == 0 {
            return Err(Error::Config {
                message: "size limits must be greater than zero".to_string(),
                key: Some("delivery".to_string()),
            });
        }
        if d.small_limit > d.large_limit {
            return Err(Error::Config {
                message: format!(
                    "small_limit ({}) exceeds large_limit ({})",
                    d.small_limit, d.large_limit
                ),
                key: Some("delivery.small_limit".to_string()),
            });
        }
        if d.chunk_size >= d.large_limit {
            return Err(Error::Config {
                message: format!(
                    "chunk_size ({}) must be smaller than large_limit ({})",
                    d.chunk_size, d.large_limit
                ),
                key: Some("delivery.chunk_size".to_string()),
            });
        }
        if d.max_timeout < d.base_timeout {
            return Err(Error::Config {
                message: "max_timeout must not be shorter than base_timeout".to_string(),
                key: Some("delivery.max_timeout".to_string()),
            });
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(raw: &str, key: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e| Error::Config {
        message: format!("{key}={raw:?}: {e}"),
        key: Some(key.to_string()),
    })
}

fn default_true() -> bool {
    true
}

fn default_downloads_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_file_validity_days() -> u64 {
    3
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

fn default_retries() -> u32 {
    10
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_small_limit() -> u64 {
    50 * MIB
}

fn default_large_limit() -> u64 {
    2000 * MIB
}

fn default_chunk_size() -> u64 {
    // 1.95 GiB
    GIB * 195 / 100
}

fn default_max_split_total() -> u64 {
    16 * GIB
}

fn default_base_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_timeout_step() -> Duration {
    Duration::from_secs(60)
}

fn default_max_timeout() -> Duration {
    Duration::from_secs(1800)
}

fn default_notify_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_pause_between_parts() -> Duration {
    Duration::from_secs(1)
}

fn default_bot_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_poll_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".into()]
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
