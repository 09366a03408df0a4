//! Configuration management for Ferry.
//!
//! Configuration is loaded once at startup and read-only afterwards; the
//! transfer sessions copy what they need into a
//! [`TransferConfig`](crate::transfer::TransferConfig) so tests can override
//! values without touching process state.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/ferry/config.toml` |
//! | macOS | `~/Library/Application Support/Ferry/config.toml` |
//! | Windows | `%APPDATA%\Ferry\config.toml` |
//!
//! Every option has a default, so a missing file is not an error.

use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable that forces test mode (auto-accept) when set to `1`.
pub const TEST_MODE_ENV: &str = "FERRY_TEST_MODE";

static GLOBAL: OnceLock<Config> = OnceLock::new();

/// Main configuration struct for Ferry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network settings
    pub network: NetworkConfig,
    /// Transfer settings
    pub transfer: TransferSettings,
    /// Auto-accept incoming transfers without prompting
    pub test_mode: bool,
}

/// Network configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// UDP port the transfer listener binds
    pub port: u16,
    /// Keep-alive interval hint for the transport
    #[serde(with = "humantime_serde")]
    pub keepalive: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: crate::DEFAULT_TRANSFER_PORT,
            keepalive: crate::CONNECTION_KEEPALIVE,
        }
    }
}

/// Transfer configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    /// Chunk size carried in every outbound request
    pub chunk_size: u64,
    /// Attempts per chunk, including the first
    pub max_retries: u32,
    /// Deadline for each substream operation
    #[serde(with = "humantime_serde")]
    pub stream_timeout: Duration,
    /// Deadline for a whole session
    #[serde(with = "humantime_serde")]
    pub session_deadline: Duration,
    /// Payloads at or below this size use pooled buffers
    pub buffer_threshold: u64,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            max_retries: crate::MAX_RETRIES,
            stream_timeout: crate::STREAM_TIMEOUT,
            session_deadline: crate::SESSION_DEADLINE,
            buffer_threshold: crate::CHUNK_BUFFER_THRESHOLD,
        }
    }
}

impl Config {
    /// Load configuration from the platform config file.
    ///
    /// A missing file yields the defaults. The `FERRY_TEST_MODE` environment
    /// variable overrides `test_mode` either way.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => {
                let contents = std::fs::read_to_string(&path)?;
                toml::from_str(&contents)
                    .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?
            }
            _ => Self::default(),
        };

        if std::env::var(TEST_MODE_ENV).is_ok_and(|v| v == "1") {
            config.test_mode = true;
        }

        Ok(config)
    }

    /// Path of the configuration file, if a config dir can be determined.
    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "ferry", "Ferry")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// The process-wide configuration, loading it on first use.
    ///
    /// Load errors fall back to defaults here; callers that want to surface
    /// them should call [`Config::load`] at startup instead.
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(|| Self::load().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol_constants() {
        let config = Config::default();

        assert_eq!(config.transfer.chunk_size, 32 * 1024 * 1024);
        assert_eq!(config.transfer.max_retries, 3);
        assert_eq!(config.transfer.stream_timeout, Duration::from_secs(30));
        assert_eq!(config.transfer.session_deadline, Duration::from_secs(3600));
        assert_eq!(config.transfer.buffer_threshold, 32 * 1024);
        assert_eq!(config.network.port, 8080);
        assert_eq!(config.network.keepalive, Duration::from_secs(15));
        assert!(!config.test_mode);
    }

    #[test]
    fn test_parse_partial_file() {
        let config: Config = toml::from_str(
            r#"
            test_mode = true

            [transfer]
            chunk_size = 1048576
            stream_timeout = "10s"
            "#,
        )
        .expect("parse config");

        assert!(config.test_mode);
        assert_eq!(config.transfer.chunk_size, 1024 * 1024);
        assert_eq!(config.transfer.stream_timeout, Duration::from_secs(10));
        // Unspecified options keep their defaults.
        assert_eq!(config.transfer.max_retries, 3);
        assert_eq!(config.network.port, 8080);
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = Config::default();
        let serialized = toml::to_string(&config).expect("serialize");
        let parsed: Config = toml::from_str(&serialized).expect("parse");

        assert_eq!(parsed.transfer.chunk_size, config.transfer.chunk_size);
        assert_eq!(parsed.network.keepalive, config.network.keepalive);
    }
}
