//! Relay server settings.
//!
//! Resolved from, highest priority first: command-line flags, `RELAY_*`
//! environment variables (through clap's `env` support), the `[relay]`
//! table of `~/.config/paircast-relay/config.toml`, and built-in defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:4000";

/// Default upper bound on an inbound text frame, in bytes. Matches the
/// largest frame a client builds for a valid message.
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = paircast_proto::relay::MAX_FRAME_SIZE;

/// Problems encountered while assembling a [`RelayConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    ReadFile {
        /// File that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("invalid relay config: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// The bind address is not `host:port`.
    #[error("invalid bind address `{addr}`: {source}")]
    BindAddr {
        /// Value as given.
        addr: String,
        /// Parser error.
        source: std::net::AddrParseError,
    },

    /// The payload limit would reject every frame.
    #[error("max_payload_size must be at least 1 byte")]
    ZeroPayloadLimit,
}

/// On-disk layout. Every key is optional.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RelayFile {
    relay: RelayTable,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RelayTable {
    bind_addr: Option<String>,
    max_payload_size: Option<usize>,
    log_level: Option<String>,
}

/// Command-line flags for `paircast-relay`.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Paircast broadcast relay server")]
pub struct RelayCliArgs {
    /// Address to listen on, e.g. `127.0.0.1:4000`.
    #[arg(short, long, env = "RELAY_ADDR")]
    pub bind: Option<String>,

    /// Alternate config file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Largest accepted text frame in bytes.
    #[arg(long, env = "RELAY_MAX_PAYLOAD")]
    pub max_payload_size: Option<usize>,

    /// Tracing filter such as `info` or `paircast_relay=debug`.
    #[arg(long, env = "RELAY_LOG")]
    pub log_level: Option<String>,
}

/// Settings the relay runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Socket to listen on.
    pub bind_addr: SocketAddr,
    /// Largest accepted text frame in bytes.
    pub max_payload_size: usize,
    /// Tracing filter directive.
    pub log_level: String,
}

impl RelayConfig {
    /// Read the config file (if any) and merge it with `cli`.
    ///
    /// An explicit `--config` path must exist; the default path may be
    /// absent.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed, or
    /// when the merged values are invalid.
    pub fn load(cli: &RelayCliArgs) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => read_file(path)?,
            None => match default_path() {
                Some(path) if path.exists() => read_file(&path)?,
                _ => RelayFile::default(),
            },
        };
        Self::merge(cli, file.relay)
    }

    fn merge(cli: &RelayCliArgs, table: RelayTable) -> Result<Self, ConfigError> {
        let addr = cli
            .bind
            .clone()
            .or(table.bind_addr)
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_owned());
        let bind_addr = addr
            .parse()
            .map_err(|source| ConfigError::BindAddr { addr, source })?;

        let max_payload_size = cli
            .max_payload_size
            .or(table.max_payload_size)
            .unwrap_or(DEFAULT_MAX_PAYLOAD_SIZE);
        if max_payload_size == 0 {
            return Err(ConfigError::ZeroPayloadLimit);
        }

        let log_level = cli
            .log_level
            .clone()
            .or(table.log_level)
            .unwrap_or_else(|| "info".to_owned());

        Ok(Self {
            bind_addr,
            max_payload_size,
            log_level,
        })
    }
}

fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("paircast-relay").join("config.toml"))
}

fn read_file(path: &Path) -> Result<RelayFile, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&text)?)
}
