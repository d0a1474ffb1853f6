//! Configuration management for GossipChain

use serde::Deserialize;
use std::fs;
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::path::Path;

use crate::error::ChainError;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NetworkConfig {
    #[serde(default = "default_api_addr")]
    pub api_addr: String,
    #[serde(default = "default_p2p_addr")]
    pub p2p_addr: String,
    #[serde(default)]
    pub peers: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            api_addr: default_api_addr(),
            p2p_addr: default_p2p_addr(),
            peers: Vec::new(),
        }
    }
}

fn default_api_addr() -> String {
    ":3001".to_string()
}

fn default_p2p_addr() -> String {
    ":6001".to_string()
}

impl Config {
    /// Applies command line values on top of the file configuration.
    pub fn with_overrides(
        mut self,
        api_addr: Option<String>,
        p2p_addr: Option<String>,
        peers: Option<&str>,
    ) -> Self {
        if let Some(addr) = api_addr {
            self.network.api_addr = addr;
        }
        if let Some(addr) = p2p_addr {
            self.network.p2p_addr = addr;
        }
        if let Some(list) = peers {
            self.network.peers = parse_peer_list(list);
        }
        self
    }

    pub fn api_socket_addr(&self) -> Result<SocketAddr, ChainError> {
        parse_listen_addr(&self.network.api_addr)
    }

    pub fn p2p_socket_addr(&self) -> Result<SocketAddr, ChainError> {
        parse_listen_addr(&self.network.p2p_addr)
    }

    pub fn validate(&self) -> Result<(), ChainError> {
        self.api_socket_addr()?;
        self.p2p_socket_addr()?;
        Ok(())
    }
}

/// Loads the configuration file, falling back to defaults when it is absent.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ChainError> {
    let path = path.as_ref();
    let config: Config = match fs::read_to_string(path) {
        Ok(contents) => toml::from_str(&contents)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
        Err(e) => return Err(e.into()),
    };
    config.validate()?;
    Ok(config)
}

/// Accepts `HOST:PORT` or the short form `:PORT` (all interfaces).
pub fn parse_listen_addr(addr: &str) -> Result<SocketAddr, ChainError> {
    let addr = addr.trim();
    if let Some(port) = addr.strip_prefix(':') {
        let port: u16 = port
            .parse()
            .map_err(|_| ChainError::ConfigError(format!("Invalid port in {:?}", addr)))?;
        return Ok(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)));
    }
    addr.to_socket_addrs()
        .map_err(|e| ChainError::ConfigError(format!("Invalid listen address {:?}: {}", addr, e)))?
        .next()
        .ok_or_else(|| ChainError::ConfigError(format!("Address {:?} did not resolve", addr)))
}

/// Splits a comma separated peer list, skipping empty entries.
pub fn parse_peer_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|peer| !peer.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.p2p_socket_addr().unwrap().port(), 6001);
        assert_eq!(config.api_socket_addr().unwrap().port(), 3001);
        assert!(config.network.peers.is_empty());
    }

    #[test]
    fn test_load_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[network]\napi_addr = \"127.0.0.1:3002\"\npeers = [\"ws://127.0.0.1:6001\"]"
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.network.api_addr, "127.0.0.1:3002");
        assert_eq!(config.network.p2p_addr, ":6001");
        assert_eq!(config.network.peers, vec!["ws://127.0.0.1:6001".to_string()]);
    }

    #[test]
    fn test_invalid_listen_addr_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[network]\np2p_addr = \":notaport\"").unwrap();
        assert!(matches!(
            load_config(file.path()),
            Err(ChainError::ConfigError(_))
        ));
    }

    #[test]
    fn test_cli_overrides() {
        let config = Config::default().with_overrides(
            Some(":3002".to_string()),
            None,
            Some("ws://a:6001, ,b:6002"),
        );
        assert_eq!(config.network.api_addr, ":3002");
        assert_eq!(config.network.p2p_addr, ":6001");
        assert_eq!(config.network.peers, vec!["ws://a:6001", "b:6002"]);
    }

    #[test]
    fn test_parse_listen_addr() {
        assert_eq!(
            parse_listen_addr(":6001").unwrap(),
            "0.0.0.0:6001".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            parse_listen_addr("127.0.0.1:3001").unwrap(),
            "127.0.0.1:3001".parse::<SocketAddr>().unwrap()
        );
        assert!(parse_listen_addr("nonsense").is_err());
    }
}
