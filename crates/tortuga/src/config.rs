use std::{path::Path, time::Duration};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{error::Error, tcp_wire::BLOCK_LEN};

/// Tunables of a download session.
///
/// Read from `config.toml` in the user's config folder, every field is
/// optional and falls back to its default.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Seconds to wait for a peer to accept the TCP connection.
    pub connect_timeout: u64,
    /// Seconds to complete the handshake and receive the bitfield.
    pub handshake_timeout: u64,
    /// Seconds a single piece download attempt may take.
    pub piece_timeout: u64,
    /// How many block requests are kept in flight per peer.
    pub max_requests: usize,
    /// Size of a requested block, in bytes.
    pub block_len: u32,
    /// Port reported to the tracker.
    pub port: u16,
    /// Maximum number of peers downloaded from at the same time.
    pub max_peers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connect_timeout: 5,
            handshake_timeout: 15,
            piece_timeout: 30,
            max_requests: 5,
            block_len: BLOCK_LEN,
            port: 6881,
            max_peers: 50,
        }
    }
}

impl Config {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout)
    }

    pub fn piece_timeout(&self) -> Duration {
        Duration::from_secs(self.piece_timeout)
    }

    /// Load the configuration file from the user's config folder.
    ///
    /// A missing file, or a system without a home folder, gives the default
    /// configuration.
    ///
    /// # Errors
    ///
    /// If the file exists but can't be read, or is not valid toml.
    pub async fn load() -> Result<Self, Error> {
        let Some(dirs) = ProjectDirs::from("", "", "Tortuga") else {
            return Ok(Self::default());
        };

        let path = dirs.config_dir().join("config.toml");

        if !path.exists() {
            debug!("no config file at {path:?}, using defaults");
            return Ok(Self::default());
        }

        Self::from_path(path).await
    }

    /// Load the configuration from a toml file at `path`.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let s = tokio::fs::read_to_string(path).await?;
        Self::from_toml(&s)
    }

    pub fn from_toml(s: &str) -> Result<Self, Error> {
        let mut config = toml::from_str::<Config>(s)?;

        // values that would stall every download
        config.max_requests = config.max_requests.max(1);
        config.max_peers = config.max_peers.max(1);
        if config.block_len == 0 {
            config.block_len = BLOCK_LEN;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_uses_defaults() {
        let config = Config::from_toml("max_requests = 10\nport = 51413").unwrap();

        assert_eq!(config.max_requests, 10);
        assert_eq!(config.port, 51413);
        assert_eq!(config.block_len, 16384);
        assert_eq!(config.piece_timeout(), Duration::from_secs(30));
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn empty_file() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
    }

    #[test]
    fn zero_values_are_clamped() {
        let config =
            Config::from_toml("max_requests = 0\nblock_len = 0\nmax_peers = 0")
                .unwrap();

        assert_eq!(config.max_requests, 1);
        assert_eq!(config.block_len, BLOCK_LEN);
        assert_eq!(config.max_peers, 1);
    }

    #[test]
    fn invalid_toml() {
        let r = Config::from_toml("max_requests = \"many\"");
        assert!(matches!(r, Err(Error::ConfigDeserializeError(_))));
    }

    #[tokio::test]
    async fn from_path() {
        let path = std::env::temp_dir()
            .join(format!("tortuga-config-{}.toml", std::process::id()));
        tokio::fs::write(&path, "handshake_timeout = 3").await.unwrap();

        let config = Config::from_path(&path).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(config.handshake_timeout(), Duration::from_secs(3));
        assert_eq!(config.max_peers, 50);
    }
}
