use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, info, warn};
use thiserror::Error;

use super::peers::PeerRegistry;
use crate::blockchain::{ChainSnapshot, Ledger};

/// How long a single peer gets to answer before it is skipped
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on the size of a chain download
const MAX_CHAIN_BYTES: usize = 64 * 1024 * 1024;

/// Errors that can occur while consulting a peer
///
/// None of these abort a resolution; the offending peer is skipped.
#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("Peer {peer} is unreachable: {reason}")]
    PeerUnreachable { peer: String, reason: String },

    #[error("Peer {peer} sent an invalid response: {reason}")]
    PeerInvalidResponse { peer: String, reason: String },

    #[error("Peer {peer} offered an invalid chain")]
    ChainInvalid { peer: String },
}

/// Source of peer chains
#[async_trait(?Send)]
pub trait ChainFetcher {
    /// Fetches the chain a peer currently holds
    async fn fetch_chain(&self, peer: &str) -> Result<ChainSnapshot, ConsensusError>;
}

/// Fetches chains from the `/chain` endpoint of peer nodes over HTTP
#[derive(Debug, Clone)]
pub struct HttpChainFetcher {
    timeout: Duration,
}

impl Default for HttpChainFetcher {
    fn default() -> Self {
        HttpChainFetcher::new(DEFAULT_PEER_TIMEOUT)
    }
}

impl HttpChainFetcher {
    pub fn new(timeout: Duration) -> Self {
        HttpChainFetcher { timeout }
    }
}

#[async_trait(?Send)]
impl ChainFetcher for HttpChainFetcher {
    async fn fetch_chain(&self, peer: &str) -> Result<ChainSnapshot, ConsensusError> {
        let url = format!("http://{peer}/chain");
        let client = awc::Client::builder().timeout(self.timeout).finish();

        let request = async {
            let mut response = client.get(url.as_str()).send().await.map_err(|err| {
                ConsensusError::PeerUnreachable {
                    peer: peer.to_string(),
                    reason: err.to_string(),
                }
            })?;

            if !response.status().is_success() {
                return Err(ConsensusError::PeerInvalidResponse {
                    peer: peer.to_string(),
                    reason: format!("status {}", response.status()),
                });
            }

            response
                .json::<ChainSnapshot>()
                .limit(MAX_CHAIN_BYTES)
                .await
                .map_err(|err| ConsensusError::PeerInvalidResponse {
                    peer: peer.to_string(),
                    reason: err.to_string(),
                })
        };

        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| ConsensusError::PeerUnreachable {
                peer: peer.to_string(),
                reason: format!("no answer within {:?}", self.timeout),
            })?
    }
}

/// Reconciles the local chain with peers using the longest valid chain rule
#[derive(Debug, Clone, Default)]
pub struct ConsensusResolver<F> {
    fetcher: F,
}

impl<F: ChainFetcher> ConsensusResolver<F> {
    pub fn new(fetcher: F) -> Self {
        ConsensusResolver { fetcher }
    }

    /// Replaces the local chain with the longest valid chain among the peers
    ///
    /// All peers are queried concurrently. A candidate has to be strictly
    /// longer than the best chain seen so far, so a peer whose chain only
    /// ties with ours never wins. Unreachable peers, bad responses and
    /// invalid chains are logged and skipped.
    ///
    /// # Returns
    ///
    /// true if the local chain was replaced
    pub async fn resolve(&self, ledger: &Ledger, peers: &PeerRegistry) -> bool {
        if peers.is_empty() {
            info!("No peers registered, local chain is authoritative");
            return false;
        }

        let peers = peers.peers();
        let responses = join_all(peers.iter().map(|peer| self.fetcher.fetch_chain(peer))).await;

        let mut best_length = ledger.current_chain().length;
        let mut best_chain = None;

        for (peer, response) in peers.iter().zip(responses) {
            let snapshot = match response {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!("Skipping peer: {}", err);
                    continue;
                }
            };

            if snapshot.length != snapshot.chain.len() {
                let err = ConsensusError::PeerInvalidResponse {
                    peer: peer.clone(),
                    reason: format!(
                        "reported length {} but sent {} blocks",
                        snapshot.length,
                        snapshot.chain.len()
                    ),
                };
                warn!("Skipping peer: {}", err);
                continue;
            }

            if snapshot.length <= best_length {
                debug!(
                    "Peer {} holds {} blocks, not longer than {}",
                    peer, snapshot.length, best_length
                );
                continue;
            }

            if !ledger.is_chain_valid(&snapshot.chain) {
                warn!("Skipping peer: {}", ConsensusError::ChainInvalid { peer: peer.clone() });
                continue;
            }

            best_length = snapshot.length;
            best_chain = Some(snapshot.chain);
        }

        match best_chain {
            Some(chain) => {
                let replaced = ledger.replace_chain(chain);
                if replaced {
                    info!("Adopted peer chain of {} blocks", best_length);
                }
                replaced
            }
            None => {
                info!("Local chain is authoritative");
                false
            }
        }
    }
}
