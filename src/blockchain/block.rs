use chrono::Utc;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use utoipa::ToSchema;

use super::hasher;
use super::transaction::Transaction;

/// Proof carried by the genesis block
pub const GENESIS_PROOF: u64 = 100;

/// Value written in place of a hash for the genesis block's predecessor
pub const GENESIS_SENTINEL: u64 = 1;

/// Link from a block to the one before it
///
/// On the wire the genesis link is the integer `1` and every other link is
/// the hex digest of the previous block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviousHash {
    Genesis,
    Hash(String),
}

impl Serialize for PreviousHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PreviousHash::Genesis => serializer.serialize_u64(GENESIS_SENTINEL),
            PreviousHash::Hash(hash) => serializer.serialize_str(hash),
        }
    }
}

impl<'de> Deserialize<'de> for PreviousHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Hash(String),
            Sentinel(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Hash(hash) => Ok(PreviousHash::Hash(hash)),
            Raw::Sentinel(GENESIS_SENTINEL) => Ok(PreviousHash::Genesis),
            Raw::Sentinel(other) => Err(D::Error::custom(format!(
                "unexpected previous_hash sentinel {other}"
            ))),
        }
    }
}

/// Represents a block in the blockchain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// Position of the block in the chain, starting at 1
    pub index: u64,

    /// Creation time in seconds since the Unix epoch
    pub timestamp: f64,

    /// List of transactions included in this block
    pub transactions: Vec<Transaction>,

    /// Proof of work solved against the previous block's proof
    pub proof: u64,

    /// Hash of the previous block
    #[schema(value_type = String)]
    pub previous_hash: PreviousHash,
}

impl Block {
    /// Creates a new block stamped with the current time
    ///
    /// # Arguments
    ///
    /// * `index` - The index of the block in the chain
    /// * `transactions` - The list of transactions to include in the block
    /// * `proof` - The proof of work
    /// * `previous_hash` - The hash of the previous block
    pub fn new(
        index: u64,
        transactions: Vec<Transaction>,
        proof: u64,
        previous_hash: PreviousHash,
    ) -> Self {
        Block {
            index,
            timestamp: now_secs(),
            transactions,
            proof,
            previous_hash,
        }
    }

    /// Creates the genesis block (first block in the chain)
    pub fn genesis() -> Self {
        Block::new(1, Vec::new(), GENESIS_PROOF, PreviousHash::Genesis)
    }

    /// Calculates the canonical SHA-256 hash of the block
    pub fn hash(&self) -> Result<String, serde_json::Error> {
        hasher::digest(self)
    }
}

fn now_secs() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
