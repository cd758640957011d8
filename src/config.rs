//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::{ClientConfig, TimerPolicy};
use crate::protocol::ProtocolConfig;
use crate::token::FileTokenStore;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub endpoint: EndpointConfig,

    #[serde(default)]
    pub protocol: ProtocolKeysConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub token: TokenConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Notification service endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_url")]
    pub url: String,
}

fn default_url() -> String {
    "ws://localhost:8080/ws".to_string()
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self { url: default_url() }
    }
}

/// Server message type keys
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolKeysConfig {
    #[serde(default = "default_auth_type")]
    pub auth_message_type: String,

    #[serde(default = "default_notification_type")]
    pub notification_message_type: String,
}

fn default_auth_type() -> String {
    "auth".to_string()
}

fn default_notification_type() -> String {
    "notification".to_string()
}

impl Default for ProtocolKeysConfig {
    fn default() -> Self {
        Self {
            auth_message_type: default_auth_type(),
            notification_message_type: default_notification_type(),
        }
    }
}

/// Timers
#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_auth_timeout")]
    pub auth_timeout_ms: u64,

    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,

    /// Cancel pending timers on close instead of letting them fire
    #[serde(default)]
    pub cancel_timers: bool,
}

fn default_auth_timeout() -> u64 {
    2000 // 2 seconds
}

fn default_reconnect_delay() -> u64 {
    3000 // 3 seconds
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            auth_timeout_ms: default_auth_timeout(),
            reconnect_delay_ms: default_reconnect_delay(),
            cancel_timers: false,
        }
    }
}

/// Where the session token is kept
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenConfig {
    /// Defaults to the per-user data directory
    pub file: Option<String>,
}

impl TokenConfig {
    pub fn store(&self) -> FileTokenStore {
        match &self.file {
            Some(path) => FileTokenStore::new(path),
            None => FileTokenStore::new(FileTokenStore::default_path()),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
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
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        for path in Self::default_paths() {
            if path.exists() {
                match Self::load_with_env(&path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        // Fall back to environment-only config
        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Candidate config files, highest priority first
    pub fn default_paths() -> Vec<PathBuf> {
        [
            dirs::config_dir().map(|p| p.join("console-notify").join("config.toml")),
            Some(PathBuf::from("/etc/console-notify/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Endpoint overrides
        if let Some(url) = var("CONSOLE_NOTIFY_WS_URL") {
            self.endpoint.url = url;
        }

        // Protocol overrides
        if let Some(key) = var("CONSOLE_NOTIFY_AUTH_TYPE") {
            self.protocol.auth_message_type = key;
        }
        if let Some(key) = var("CONSOLE_NOTIFY_NOTIFICATION_TYPE") {
            self.protocol.notification_message_type = key;
        }

        // Token overrides
        if let Some(file) = var("CONSOLE_NOTIFY_TOKEN_FILE") {
            self.token.file = Some(file);
        }

        // Logging overrides
        if let Some(level) = var("CONSOLE_NOTIFY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("CONSOLE_NOTIFY_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Settings for the connection manager
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            endpoint: self.endpoint.url.clone(),
            protocol: ProtocolConfig {
                auth_message_type: self.protocol.auth_message_type.clone(),
                notification_message_type: self.protocol.notification_message_type.clone(),
            },
            auth_timeout: Duration::from_millis(self.timing.auth_timeout_ms),
            reconnect_delay: Duration::from_millis(self.timing.reconnect_delay_ms),
            timer_policy: if self.timing.cancel_timers {
                TimerPolicy::Cancellable
            } else {
                TimerPolicy::FireAndForget
            },
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Console Notify Configuration
#
# Environment variables override these settings:
# - CONSOLE_NOTIFY_WS_URL
# - CONSOLE_NOTIFY_AUTH_TYPE
# - CONSOLE_NOTIFY_NOTIFICATION_TYPE
# - CONSOLE_NOTIFY_TOKEN_FILE
# - CONSOLE_NOTIFY_LOG_LEVEL
# - CONSOLE_NOTIFY_LOG_FORMAT

[endpoint]
# Notification service WebSocket URL
url = "ws://localhost:8080/ws"

[protocol]
# Message type of the server's authentication response
auth_message_type = "auth"

# Message type of unread-count pushes
notification_message_type = "notification"

[timing]
# Time allowed for an authentication response (ms)
auth_timeout_ms = 2000

# Delay before reconnecting after the connection closes (ms)
reconnect_delay_ms = 3000

# Cancel pending timers when the client is closed
cancel_timers = false

[token]
# Token file (defaults to the per-user data directory)
# file = "~/.local/share/console-notify/token"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_parses_to_defaults() {
        let config = Config::parse(&generate_default_config()).unwrap();
        let defaults = Config::default();

        assert_eq!(config.endpoint.url, defaults.endpoint.url);
        assert_eq!(config.protocol.auth_message_type, "auth");
        assert_eq!(config.protocol.notification_message_type, "notification");
        assert_eq!(config.timing.auth_timeout_ms, 2000);
        assert_eq!(config.timing.reconnect_delay_ms, 3000);
        assert!(!config.timing.cancel_timers);
        assert!(config.token.file.is_none());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::parse(
            r#"
[endpoint]
url = "wss://console.example/ws"

[timing]
cancel_timers = true
"#,
        )
        .unwrap();

        assert_eq!(config.endpoint.url, "wss://console.example/ws");
        assert!(config.timing.cancel_timers);
        assert_eq!(config.timing.reconnect_delay_ms, 3000);
        assert_eq!(config.protocol.auth_message_type, "auth");
    }

    #[test]
    fn test_client_config() {
        let mut config = Config::default();
        config.protocol.notification_message_type = "unread".to_string();
        config.timing.auth_timeout_ms = 500;
        config.timing.cancel_timers = true;

        let client = config.client_config();
        assert_eq!(client.endpoint, "ws://localhost:8080/ws");
        assert_eq!(client.protocol.notification_message_type, "unread");
        assert_eq!(client.auth_timeout, Duration::from_millis(500));
        assert_eq!(client.reconnect_delay, Duration::from_secs(3));
        assert_eq!(client.timer_policy, TimerPolicy::Cancellable);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CONSOLE_NOTIFY_WS_URL", "ws://override/ws"),
            ("CONSOLE_NOTIFY_AUTH_TYPE", "session"),
            ("CONSOLE_NOTIFY_TOKEN_FILE", "/tmp/token"),
            ("CONSOLE_NOTIFY_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.endpoint.url, "ws://override/ws");
        assert_eq!(config.protocol.auth_message_type, "session");
        assert_eq!(config.protocol.notification_message_type, "notification");
        assert_eq!(config.token.file.as_deref(), Some("/tmp/token"));
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[token]\nfile = \"/var/lib/token\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.token.store().path(), Path::new("/var/lib/token"));
    }

    #[test]
    fn test_load_errors() {
        let dir = TempDir::new().unwrap();

        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            Config::load(&missing),
            Err(ConfigError::Io { .. })
        ));

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[endpoint\nurl = ").unwrap();
        assert!(matches!(
            Config::load(&broken),
            Err(ConfigError::Parse { .. })
        ));
    }
}
