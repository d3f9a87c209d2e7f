//! Configuration loading
//!
//! Settings come from a TOML file; every field has a built-in default so a missing
//! file (or a partial one) still yields a usable configuration.
//!
//! Config file resolution priority:
//! 1. Explicit path (command-line argument)
//! 2. `INNCHECK_CONFIG` environment variable
//! 3. Platform config file (`~/.config/inncheck/config.toml`, then `/etc/inncheck/config.toml`)
//! 4. Built-in defaults

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "INNCHECK_CONFIG";

/// Top-level configuration file
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Telegram Bot API settings
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Bot token (usually supplied via TELEGRAM_TOKEN instead)
    #[serde(default)]
    pub token: Option<String>,

    /// Bot API base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Long-poll timeout for getUpdates, seconds
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,

    /// Timeout for outbound Bot API calls (sendMessage, deleteMessage), seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Request queue settings
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of waiting requests
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
}

/// Bounded retry budgets
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_attempts")]
    pub fetch_attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub fetch_delay_ms: u64,

    #[serde(default = "default_attempts")]
    pub delivery_attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub delivery_delay_ms: u64,
}

/// Shared headless browser settings
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    /// Render endpoint of the shared browser (browserless-compatible `/content`)
    #[serde(default = "default_render_endpoint")]
    pub render_endpoint: String,

    /// Budget for a single page load, milliseconds
    #[serde(default = "default_page_timeout_ms")]
    pub page_timeout_ms: u64,

    /// Extra wait after load so client-side rendering can finish, milliseconds
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Minimum spacing between two navigations, milliseconds
    #[serde(default = "default_min_navigation_interval_ms")]
    pub min_navigation_interval_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Source site locations
#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "default_efrsb_url")]
    pub efrsb_url: String,

    #[serde(default = "default_kad_url")]
    pub kad_url: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_queue_capacity() -> usize {
    10
}

fn default_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_render_endpoint() -> String {
    "http://localhost:3000".to_string()
}

fn default_page_timeout_ms() -> u64 {
    30_000
}

fn default_settle_ms() -> u64 {
    3000
}

fn default_min_navigation_interval_ms() -> u64 {
    1000
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36"
        .to_string()
}

fn default_efrsb_url() -> String {
    "https://bankrot.fedresurs.ru".to_string()
}

fn default_kad_url() -> String {
    "https://kad.arbitr.ru".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: default_api_url(),
            poll_timeout_secs: default_poll_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            fetch_attempts: default_attempts(),
            fetch_delay_ms: default_retry_delay_ms(),
            delivery_attempts: default_attempts(),
            delivery_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn fetch_delay(&self) -> Duration {
        Duration::from_millis(self.fetch_delay_ms)
    }

    pub fn delivery_delay(&self) -> Duration {
        Duration::from_millis(self.delivery_delay_ms)
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            render_endpoint: default_render_endpoint(),
            page_timeout_ms: default_page_timeout_ms(),
            settle_ms: default_settle_ms(),
            min_navigation_interval_ms: default_min_navigation_interval_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            efrsb_url: default_efrsb_url(),
            kad_url: default_kad_url(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl TomlConfig {
    /// Parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: TomlConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve and load the configuration
    ///
    /// An explicitly named file (argument or environment) must exist. A missing
    /// platform config file is not an error: defaults are used.
    ///
    /// Returns the configuration and the file it came from, if any. Nothing is
    /// logged here; this runs before the subscriber exists.
    pub fn resolve(cli_path: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        // Priority 1: Command-line argument
        if let Some(path) = cli_path {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let path = PathBuf::from(path);
            return Ok((Self::load(&path)?, Some(path)));
        }

        // Priority 3: Platform config file
        if let Some(path) = find_platform_config_file() {
            return Ok((Self::load(&path)?, Some(path)));
        }

        // Priority 4: Built-in defaults
        Ok((Self::default(), None))
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.queue.capacity == 0 {
            return Err(Error::Config("queue.capacity must be at least 1".to_string()));
        }
        if self.retry.fetch_attempts == 0 {
            return Err(Error::Config("retry.fetch_attempts must be at least 1".to_string()));
        }
        if self.retry.delivery_attempts == 0 {
            return Err(Error::Config(
                "retry.delivery_attempts must be at least 1".to_string(),
            ));
        }
        if self.browser.page_timeout_ms == 0 {
            return Err(Error::Config("browser.page_timeout_ms must be positive".to_string()));
        }
        Ok(())
    }
}

/// Platform config file, if one exists
fn find_platform_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("inncheck").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(unix) {
        let system_config = PathBuf::from("/etc/inncheck/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}
