// Network module
//
// Peer bookkeeping and longest-valid-chain consensus between nodes

pub mod consensus;
pub mod peers;

pub use consensus::{ConsensusResolver, HttpChainFetcher};
pub use peers::PeerRegistry;
