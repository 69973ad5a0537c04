use actix_web::http::Uri;
use dashmap::DashSet;
use log::info;
use thiserror::Error;

/// Errors that can occur while registering peers
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeerError {
    #[error("Invalid address: {0:?}")]
    InvalidAddress(String),
}

/// Extracts the `host[:port]` authority from a peer address
///
/// Accepts full URLs such as `http://10.0.0.2:5000/` as well as bare
/// `10.0.0.2:5000` authorities.
pub fn parse_address(address: &str) -> Result<String, PeerError> {
    let invalid = || PeerError::InvalidAddress(address.to_string());

    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }

    let uri: Uri = trimmed.parse().map_err(|_| invalid())?;
    let authority = uri.authority().ok_or_else(invalid)?;
    if authority.host().is_empty() {
        return Err(invalid());
    }

    // Anything after the last ':' past the host is a port and must parse
    // as one; `Uri` would otherwise drop it and yield the bare host.
    let raw = authority.as_str();
    let host_port = raw.rsplit_once('@').map_or(raw, |(_, rest)| rest);
    let after_host = host_port.rsplit_once(']').map_or(host_port, |(_, rest)| rest);
    if after_host.contains(':') && authority.port_u16().is_none() {
        return Err(invalid());
    }

    Ok(match authority.port_u16() {
        Some(port) => format!("{}:{}", authority.host(), port),
        None => authority.host().to_string(),
    })
}

/// Set of peer nodes this node reconciles its chain with
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: DashSet<String>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a peer, returning the normalized address
    ///
    /// Registering an address that is already known is a no-op.
    pub fn register(&self, address: &str) -> Result<String, PeerError> {
        let peer = parse_address(address)?;
        if self.peers.insert(peer.clone()) {
            info!("Registered peer {}", peer);
        }
        Ok(peer)
    }

    /// Registers a batch of peers
    ///
    /// Every address is parsed before any is added, so one malformed entry
    /// leaves the registry untouched.
    pub fn register_all<S: AsRef<str>>(&self, addresses: &[S]) -> Result<Vec<String>, PeerError> {
        let parsed = addresses
            .iter()
            .map(|address| parse_address(address.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        for peer in &parsed {
            if self.peers.insert(peer.clone()) {
                info!("Registered peer {}", peer);
            }
        }
        Ok(parsed)
    }

    /// Gets all known peers in sorted order
    pub fn peers(&self) -> Vec<String> {
        let mut peers: Vec<String> = self.peers.iter().map(|peer| peer.key().clone()).collect();
        peers.sort();
        peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_url() {
        assert_eq!(parse_address("http://192.168.0.5:5000").unwrap(), "192.168.0.5:5000");
        assert_eq!(parse_address("http://node.local:5001/chain").unwrap(), "node.local:5001");
        assert_eq!(parse_address("  http://user@10.0.0.1:80 ").unwrap(), "10.0.0.1:80");
    }

    #[test]
    fn test_parse_bare_authority() {
        assert_eq!(parse_address("127.0.0.1:5001").unwrap(), "127.0.0.1:5001");
        assert_eq!(parse_address("localhost").unwrap(), "localhost");
        assert_eq!(parse_address("http://[::1]:5000/").unwrap(), "[::1]:5000");
    }

    #[test]
    fn test_register_rejects_out_of_range_port() {
        let registry = PeerRegistry::new();

        assert!(registry.register("127.0.0.1:99999").is_err());
        assert!(registry.register_all(&["127.0.0.1:5001", "127.0.0.1:65536"]).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        let addresses = [
            "",
            "   ",
            "not a url",
            "/only/a/path",
            "http://",
            "127.0.0.1:99999",
            "10.0.0.2:abc",
            "http://10.0.0.2:70000/",
            "10.0.0.2:",
            "http://[::1]:",
        ];
        for address in addresses {
            assert_eq!(
                parse_address(address),
                Err(PeerError::InvalidAddress(address.to_string())),
                "{address:?}"
            );
        }
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = PeerRegistry::new();

        registry.register("http://127.0.0.1:5001").unwrap();
        registry.register("http://127.0.0.1:5001").unwrap();
        registry.register("127.0.0.1:5001").unwrap();

        assert_eq!(registry.peers(), vec!["127.0.0.1:5001"]);
    }

    #[test]
    fn test_register_invalid_leaves_registry_untouched() {
        let registry = PeerRegistry::new();

        assert!(registry.register("not a url").is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_all() {
        let registry = PeerRegistry::new();

        let added = registry
            .register_all(&["http://127.0.0.1:5002", "127.0.0.1:5001"])
            .unwrap();
        assert_eq!(added, vec!["127.0.0.1:5002", "127.0.0.1:5001"]);
        assert_eq!(registry.peers(), vec!["127.0.0.1:5001", "127.0.0.1:5002"]);

        let result = registry.register_all(&["127.0.0.1:5003", "not a url"]);
        assert_eq!(result, Err(PeerError::InvalidAddress("not a url".into())));
        assert_eq!(registry.len(), 2);
    }
}
