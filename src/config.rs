//! # Configuration Management
//!
//! Centralized configuration for a protocol client connection.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment variables (`CRAFT_PROTOCOL_*`) via `from_env()`
//!
//! ## Sections
//! - `connection`: server endpoint, account name, protocol version, queue sizing
//! - `transport`: frame size limit, zlib level, packet capture
//! - `chat`: signing and verification switches
//! - `logging`: `tracing` output settings

use crate::error::{ProtocolError, Result};
use crate::protocol::palette::PaletteTable;
use crate::protocol::version::{MAX_SUPPORTED_VERSION, MIN_SUPPORTED_VERSION};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

/// Max allowed frame size. The server never sends frames above 2^21 bytes
/// uncompressed; the extra room covers compressed chunk batches.
pub const MAX_PAYLOAD_SIZE: usize = 8 * 1024 * 1024;

/// Default capacity of the inbound packet queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

/// Main client configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ClientConfig {
    /// Endpoint and session settings
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Transport configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Chat signing configuration
    #[serde(default)]
    pub chat: ChatConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ClientConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("CRAFT_PROTOCOL_HOST") {
            config.connection.host = host;
        }

        if let Ok(port) = std::env::var("CRAFT_PROTOCOL_PORT") {
            if let Ok(val) = port.parse::<u16>() {
                config.connection.port = val;
            }
        }

        if let Ok(username) = std::env::var("CRAFT_PROTOCOL_USERNAME") {
            config.connection.username = username;
        }

        if let Ok(version) = std::env::var("CRAFT_PROTOCOL_VERSION") {
            if let Ok(val) = version.parse::<i32>() {
                config.connection.protocol_version = val;
            }
        }

        if let Ok(path) = std::env::var("CRAFT_PROTOCOL_PALETTE_FILE") {
            config.connection.palette_file = Some(PathBuf::from(path));
        }

        if let Ok(timeout) = std::env::var("CRAFT_PROTOCOL_CONNECT_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.connection.connect_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(capture) = std::env::var("CRAFT_PROTOCOL_CAPTURE_PACKETS") {
            config.transport.capture_packets = matches!(capture.as_str(), "1" | "true" | "yes");
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.connection.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.chat.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Endpoint and session configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    /// Server host name or IP
    pub host: String,

    /// Server port
    pub port: u16,

    /// Host name announced in the handshake, when it differs from `host`
    #[serde(default)]
    pub handshake_host: Option<String>,

    /// Account name sent in Login Start
    pub username: String,

    /// Negotiated protocol version number
    pub protocol_version: i32,

    /// Timeout for the TCP connect attempt
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Maximum number of undispatched inbound packets
    pub queue_capacity: usize,

    /// TOML packet-type palette for versions without a built-in table
    #[serde(default)]
    pub palette_file: Option<PathBuf>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: 25565,
            handshake_host: None,
            username: String::from("Player"),
            protocol_version: MAX_SUPPORTED_VERSION,
            connect_timeout: Duration::from_secs(10),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            palette_file: None,
        }
    }
}

impl ConnectionConfig {
    /// Validate connection configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.host.is_empty() {
            errors.push("Server host cannot be empty".to_string());
        }

        if self.port == 0 {
            errors.push("Server port must be greater than 0".to_string());
        }

        if self.username.is_empty() {
            errors.push("Username cannot be empty".to_string());
        } else if self.username.len() > 16 {
            errors.push(format!(
                "Username too long: {} characters (maximum: 16)",
                self.username.len()
            ));
        }

        if !(MIN_SUPPORTED_VERSION..=MAX_SUPPORTED_VERSION).contains(&self.protocol_version) {
            errors.push(format!(
                "Unsupported protocol version: {} (supported: {MIN_SUPPORTED_VERSION}-{MAX_SUPPORTED_VERSION})",
                self.protocol_version
            ));
        }

        if self.connect_timeout.as_millis() < 100 {
            errors.push("Connect timeout too short (minimum: 100ms)".to_string());
        } else if self.connect_timeout.as_secs() > 300 {
            errors.push("Connect timeout too long (maximum: 300s)".to_string());
        }

        if self.queue_capacity == 0 {
            errors.push("Queue capacity must be greater than 0".to_string());
        } else if self.queue_capacity > 1_000_000 {
            errors.push(format!(
                "Queue capacity too large: {} (max recommended: 1,000,000)",
                self.queue_capacity
            ));
        }

        if self.palette_file.is_none() && PaletteTable::builtin(self.protocol_version).is_none() {
            errors.push(format!(
                "No built-in packet palette for protocol {}; set palette_file",
                self.protocol_version
            ));
        }

        errors
    }

    /// `host:port` for the TCP connect
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Maximum allowed frame size in bytes
    pub max_frame_size: usize,

    /// zlib level for outbound frames above the server threshold
    pub compression_level: u32,

    /// Mirror every packet to the handler's capture hook
    pub capture_packets: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_PAYLOAD_SIZE,
            compression_level: 6,
            capture_packets: false,
        }
    }
}

impl TransportConfig {
    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_frame_size < 2 * 1024 * 1024 {
            errors.push("Max frame size too small (minimum: 2 MB)".to_string());
        } else if self.max_frame_size > 100 * 1024 * 1024 {
            errors.push(format!(
                "Max frame size too large: {} bytes (maximum recommended: 100 MB)",
                self.max_frame_size
            ));
        }

        if self.compression_level > 9 {
            errors.push(format!(
                "Invalid compression level: {} (valid range: 0-9)",
                self.compression_level
            ));
        }

        errors
    }
}

/// Chat signing configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatConfig {
    /// Sign outgoing chat messages when a key pair is available
    pub sign_chat: bool,

    /// Sign outgoing command arguments when a key pair is available
    pub sign_commands: bool,

    /// Verify incoming player chat against the sender's key
    pub verify_incoming: bool,

    /// Forward system messages to the handler
    pub display_system_messages: bool,

    /// Prefer the server-modified text over the signed body when present
    pub show_modified_chat: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            sign_chat: true,
            sign_commands: true,
            verify_incoming: true,
            display_system_messages: true,
            show_modified_chat: true,
        }
    }
}

impl ChatConfig {
    /// Validate chat configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.sign_commands && !self.sign_chat {
            errors.push("sign_commands requires sign_chat to be enabled".to_string());
        }
        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to colourise console output
    pub log_to_console: bool,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("craft-protocol"),
            log_level: Level::INFO,
            log_to_console: true,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
