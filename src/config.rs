//! Node configuration
//!
//! Every option can be given on the command line or through the
//! environment (a `.env` file is honoured as well).

use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::blockchain::DEFAULT_DIFFICULTY;

/// Largest accepted difficulty; a SHA-256 digest has 64 hex characters but
/// anything past this would never finish mining.
pub const MAX_DIFFICULTY: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Difficulty must be between 1 and {MAX_DIFFICULTY}, got {0}")]
    InvalidDifficulty(usize),

    #[error("Peer timeout must be at least one second")]
    InvalidPeerTimeout,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "pow_ledger")]
#[command(about = "Proof-of-work ledger node with longest-chain consensus")]
#[command(version)]
pub struct NodeConfig {
    /// Address to bind the HTTP server to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    /// Number of leading zero hex digits a proof must produce
    #[arg(long, env = "DIFFICULTY", default_value_t = DEFAULT_DIFFICULTY)]
    pub difficulty: usize,

    /// Identity credited with mining rewards (random when omitted)
    #[arg(long, env = "NODE_ID")]
    pub node_id: Option<String>,

    /// Seconds a peer gets to answer during consensus
    #[arg(long, env = "PEER_TIMEOUT_SECS", default_value_t = 5)]
    pub peer_timeout_secs: u64,

    /// Peers to register at startup, e.g. `--peer http://10.0.0.2:5000`
    #[arg(long = "peer", env = "PEERS", value_delimiter = ',')]
    pub peers: Vec<String>,
}

impl NodeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_DIFFICULTY).contains(&self.difficulty) {
            return Err(ConfigError::InvalidDifficulty(self.difficulty));
        }
        if self.peer_timeout_secs == 0 {
            return Err(ConfigError::InvalidPeerTimeout);
        }
        Ok(())
    }

    /// The configured node identity, or a fresh uuid without hyphens
    pub fn node_id(&self) -> String {
        match &self.node_id {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => uuid::Uuid::new_v4().simple().to_string(),
        }
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> NodeConfig {
        let argv = std::iter::once("pow_ledger").chain(args.iter().copied());
        NodeConfig::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_explicit_arguments() {
        let config = parse(&[
            "--host",
            "127.0.0.1",
            "-p",
            "5001",
            "--difficulty",
            "3",
            "--node-id",
            "miner-1",
            "--peer-timeout-secs",
            "2",
            "--peer",
            "http://127.0.0.1:5000,127.0.0.1:5002",
        ]);

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 5001);
        assert_eq!(config.difficulty, 3);
        assert_eq!(config.node_id(), "miner-1");
        assert_eq!(config.peer_timeout(), Duration::from_secs(2));
        assert_eq!(config.peers, vec!["http://127.0.0.1:5000", "127.0.0.1:5002"]);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_generated_node_id() {
        let config = parse(&["--node-id", "  "]);
        let id = config.node_id();

        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, config.node_id());
    }

    #[test]
    fn test_validation() {
        let mut config = parse(&["--difficulty", "0", "--peer-timeout-secs", "1"]);
        assert_eq!(config.validate(), Err(ConfigError::InvalidDifficulty(0)));

        config.difficulty = 17;
        assert_eq!(config.validate(), Err(ConfigError::InvalidDifficulty(17)));

        config.difficulty = 16;
        config.peer_timeout_secs = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidPeerTimeout));
    }
}
