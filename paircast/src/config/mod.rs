//! Configuration system for the `Paircast` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/paircast/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use crate::chat::SessionOptions;
use crate::chat::roster::DEFAULT_DIRECTORY;
use crate::net::NetConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// The relay URL is not a valid URL.
    #[error("invalid relay URL {url}: {source}")]
    InvalidUrl {
        /// The rejected value.
        url: String,
        /// Parse failure.
        source: url::ParseError,
    },

    /// A setting has an unusable value.
    #[error("invalid setting `{field}`: {reason}")]
    InvalidValue {
        /// Name of the setting.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    network: NetworkFileConfig,
    chat: ChatFileConfig,
    storage: StorageFileConfig,
}

/// `[network]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct NetworkFileConfig {
    relay_url: Option<String>,
    connect_timeout_secs: Option<u64>,
    channel_capacity: Option<usize>,
}

/// `[chat]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ChatFileConfig {
    identity: Option<String>,
    directory: Option<Vec<String>>,
    optimistic_send: Option<bool>,
    curated_roster: Option<bool>,
}

/// `[storage]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StorageFileConfig {
    data_dir: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Default relay endpoint.
pub const DEFAULT_RELAY_URL: &str = "ws://127.0.0.1:4000/ws";

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Network --
    /// Relay server WebSocket URL.
    pub relay_url: String,
    /// Timeout for connecting to the relay server.
    pub connect_timeout: Duration,
    /// Channel capacity for command/event mpsc channels.
    pub channel_capacity: usize,
    /// Run without a relay; messages loop back locally.
    pub offline: bool,

    // -- Chat --
    /// Identity active at startup.
    pub identity: String,
    /// Identities known before any message is seen.
    pub directory: Vec<String>,
    /// Insert outgoing messages before the relay echo.
    pub optimistic_send: bool,
    /// Sidebar lists only added peers.
    pub curated_roster: bool,

    // -- Storage --
    /// Directory holding persisted chat state.
    pub data_dir: PathBuf,

    // -- Logging --
    /// Log level filter string.
    pub log_level: String,
    /// Log file path.
    pub log_file: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            channel_capacity: 256,
            offline: false,
            identity: "Alice".to_string(),
            directory: DEFAULT_DIRECTORY.iter().map(|&s| s.to_string()).collect(),
            optimistic_send: false,
            curated_roster: false,
            data_dir: dirs::data_dir()
                .map_or_else(|| PathBuf::from(".paircast"), |d| d.join("paircast")),
            log_level: "info".to_string(),
            log_file: std::env::temp_dir().join("paircast.log"),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed, or a resolved value is invalid.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file)
    }

    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            relay_url: cli
                .relay_url
                .clone()
                .or_else(|| file.network.relay_url.clone())
                .unwrap_or(defaults.relay_url),
            connect_timeout: file
                .network
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            channel_capacity: file
                .network
                .channel_capacity
                .unwrap_or(defaults.channel_capacity),
            offline: cli.offline,
            identity: cli
                .identity
                .clone()
                .or_else(|| file.chat.identity.clone())
                .unwrap_or(defaults.identity),
            directory: file
                .chat
                .directory
                .clone()
                .unwrap_or(defaults.directory),
            optimistic_send: file
                .chat
                .optimistic_send
                .unwrap_or(defaults.optimistic_send),
            curated_roster: file
                .chat
                .curated_roster
                .unwrap_or(defaults.curated_roster),
            data_dir: cli
                .data_dir
                .clone()
                .or_else(|| file.storage.data_dir.clone())
                .unwrap_or(defaults.data_dir),
            log_level: cli.log_level.clone().unwrap_or(defaults.log_level),
            log_file: cli.log_file.clone().unwrap_or(defaults.log_file),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.relay_url).map_err(|source| ConfigError::InvalidUrl {
            url: self.relay_url.clone(),
            source,
        })?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConfigError::InvalidValue {
                field: "relay_url",
                reason: format!("scheme must be ws or wss, got {}", url.scheme()),
            });
        }
        if self.identity.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "identity",
                reason: "must not be empty".to_string(),
            });
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "channel_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Options for the chat session.
    #[must_use]
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            optimistic_send: self.optimistic_send,
            curated_roster: self.curated_roster,
            directory: self.directory.clone(),
        }
    }

    /// Build a [`NetConfig`] from this configuration.
    ///
    /// Returns `None` in offline mode.
    #[must_use]
    pub fn to_net_config(&self) -> Option<NetConfig> {
        if self.offline {
            return None;
        }
        Some(NetConfig {
            relay_url: self.relay_url.clone(),
            connect_timeout: self.connect_timeout,
            channel_capacity: self.channel_capacity,
        })
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Pairwise chat over a broadcast relay")]
pub struct CliArgs {
    /// WebSocket URL of the relay server.
    #[arg(long, env = "PAIRCAST_RELAY_URL")]
    pub relay_url: Option<String>,

    /// Identity to chat as.
    #[arg(short, long, env = "PAIRCAST_IDENTITY")]
    pub identity: Option<String>,

    /// Directory for persisted chat state.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Path to config file (default: `~/.config/paircast/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, env = "PAIRCAST_LOG")]
    pub log_level: Option<String>,

    /// Path to log file (default: `$TMPDIR/paircast.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Do not connect to a relay; sent messages loop back locally.
    #[arg(long)]
    pub offline: bool,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("paircast").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
