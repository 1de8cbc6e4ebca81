//! Application configuration management.
//!
//! Handles loading, saving, and accessing application configuration including
//! the server address, session tuning and logging preferences. Configuration
//! is persisted as TOML on disk. Passwords and resume tokens are never part
//! of it; they live in process memory only.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::constants;
use crate::error::{RlError, RlResult};
use crate::platform::Platform;

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server connection settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Realtime session settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server origin (e.g., "http://localhost:3001").
    #[serde(default = "default_address")]
    pub address: String,

    /// Username used to log in.
    #[serde(default)]
    pub username: String,

    /// Custom HTTP headers as key-value pairs.
    #[serde(default)]
    pub custom_headers: HashMap<String, String>,

    /// API request timeout in milliseconds.
    #[serde(default = "default_api_timeout")]
    pub api_timeout_ms: u64,

    /// Whether to accept self-signed SSL certificates from the server.
    #[serde(default)]
    pub accept_self_signed_certs: bool,
}

/// What happens to live messages for rooms that are not focused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundMessages {
    /// Drop them; they show up in history when the room is opened.
    Discard,
    /// Keep a bounded queue per room and deliver it when the room is opened.
    Buffer,
}

/// Realtime session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// First reconnect delay in milliseconds.
    #[serde(default = "default_reconnect_base")]
    pub reconnect_base_ms: u64,

    /// Upper bound for the reconnect delay in milliseconds.
    #[serde(default = "default_reconnect_base")]
    pub reconnect_max_ms: u64,

    /// Growth factor applied per failed attempt (1.0 = fixed interval).
    #[serde(default = "default_multiplier")]
    pub reconnect_multiplier: f64,

    /// Jitter factor (0.0 to 1.0) applied to each delay.
    #[serde(default)]
    pub reconnect_jitter: f64,

    /// Maximum number of reconnect attempts (0 = unlimited).
    #[serde(default)]
    pub reconnect_max_attempts: u32,

    /// Window for a correlated request to be answered.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Timeout for opening the realtime connection.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Number of message ids remembered for deduplication.
    #[serde(default = "default_seen_capacity")]
    pub seen_capacity: usize,

    /// Messages fetched when a room is opened.
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,

    /// Handling of messages for rooms that are not focused.
    #[serde(default = "default_background")]
    pub background_messages: BackgroundMessages,

    /// Per-room limit when background messages are buffered.
    #[serde(default = "default_buffer_limit")]
    pub buffer_limit: usize,

    /// Room opened after login.
    #[serde(default = "default_room")]
    pub default_room: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for log files. If empty, uses default location.
    #[serde(default)]
    pub directory: String,

    /// Enable JSON structured logging output.
    #[serde(default)]
    pub json_output: bool,
}

// Default value functions for serde

fn default_address() -> String {
    constants::DEFAULT_SERVER_ADDRESS.to_string()
}

fn default_api_timeout() -> u64 {
    constants::DEFAULT_API_TIMEOUT_MS
}

fn default_reconnect_base() -> u64 {
    constants::RECONNECT_DELAY_MS
}

fn default_multiplier() -> f64 {
    1.0
}

fn default_request_timeout() -> u64 {
    constants::DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_connect_timeout() -> u64 {
    constants::DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_seen_capacity() -> usize {
    constants::MAX_SEEN_MESSAGE_HISTORY
}

fn default_history_limit() -> u32 {
    constants::DEFAULT_HISTORY_LIMIT
}

fn default_background() -> BackgroundMessages {
    BackgroundMessages::Discard
}

fn default_buffer_limit() -> usize {
    constants::DEFAULT_BUFFER_LIMIT
}

fn default_room() -> String {
    constants::DEFAULT_ROOM_ID.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            username: String::new(),
            custom_headers: HashMap::new(),
            api_timeout_ms: default_api_timeout(),
            accept_self_signed_certs: false,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_base_ms: default_reconnect_base(),
            reconnect_max_ms: default_reconnect_base(),
            reconnect_multiplier: default_multiplier(),
            reconnect_jitter: 0.0,
            reconnect_max_attempts: 0,
            request_timeout_ms: default_request_timeout(),
            connect_timeout_ms: default_connect_timeout(),
            seen_capacity: default_seen_capacity(),
            history_limit: default_history_limit(),
            background_messages: default_background(),
            buffer_limit: default_buffer_limit(),
            default_room: default_room(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
            json_output: false,
        }
    }
}

impl SessionConfig {
    /// Request timeout as a Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Connect timeout as a Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl ServerConfig {
    /// Realtime endpoint derived from the REST origin.
    ///
    /// `http` becomes `ws`, `https` becomes `wss`, and the path is replaced
    /// with the websocket path.
    pub fn websocket_url(&self) -> RlResult<String> {
        let address = AppConfig::sanitize_server_address(&self.address);
        let (scheme, rest) = if let Some(rest) = address.strip_prefix("https://") {
            ("wss", rest)
        } else if let Some(rest) = address.strip_prefix("http://") {
            ("ws", rest)
        } else {
            return Err(RlError::MissingConfig("server address".into()));
        };
        let host = rest.split('/').next().unwrap_or_default();
        if host.is_empty() {
            return Err(RlError::Config(format!("invalid server address: {}", self.address)));
        }
        Ok(format!("{scheme}://{host}{}", constants::WEBSOCKET_PATH))
    }
}

impl AppConfig {
    /// Load configuration from the default config file path.
    pub fn load_default() -> RlResult<Self> {
        let path = Self::default_config_path()?;
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> RlResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to the default config file path.
    pub fn save_default(&self) -> RlResult<()> {
        let path = Self::default_config_path()?;
        self.save_to_file(&path)
    }

    /// Save configuration to a specific file path.
    pub fn save_to_file(&self, path: &Path) -> RlResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| RlError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> RlResult<PathBuf> {
        Ok(Platform::config_dir()?.join("config.toml"))
    }

    /// Get the effective log directory, using the configured path or the default.
    pub fn effective_log_dir(&self) -> RlResult<PathBuf> {
        if self.logging.directory.is_empty() {
            Ok(Platform::data_dir()?.join("logs"))
        } else {
            Ok(PathBuf::from(&self.logging.directory))
        }
    }

    /// Sanitize and normalize a server address.
    ///
    /// Ensures the address has a scheme and strips trailing slashes.
    pub fn sanitize_server_address(address: &str) -> String {
        let trimmed = address.trim().trim_matches('"').trim();
        if trimmed.is_empty() {
            return String::new();
        }

        let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("http://{trimmed}")
        };

        with_scheme.trim_end_matches('/').to_string()
    }
}

/// Thread-safe configuration holder for shared access across commands.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<AppConfig>>,
}

impl ConfigHandle {
    /// Create a new configuration handle.
    pub fn new(config: AppConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Read the configuration.
    pub async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, AppConfig> {
        self.inner.read().await
    }

    /// Write/update the configuration.
    pub async fn write(&self) -> tokio::sync::RwLockWriteGuard<'_, AppConfig> {
        self.inner.write().await
    }

    /// Save the current configuration to disk.
    pub async fn save(&self) -> RlResult<()> {
        let config = self.inner.read().await;
        config.save_default()
    }
}
