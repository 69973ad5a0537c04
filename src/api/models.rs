use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use thiserror::Error;
use utoipa::ToSchema;

use crate::blockchain::{Block, Ledger, PreviousHash, StopSignal, Transaction};
use crate::network::{ConsensusResolver, HttpChainFetcher, PeerRegistry};

/// Shared state behind every request handler
#[derive(Debug)]
pub struct AppState {
    /// This node's ledger
    pub ledger: Ledger,

    /// Known peer nodes
    pub peers: PeerRegistry,

    /// Reconciles the ledger with the peers
    pub resolver: ConsensusResolver<HttpChainFetcher>,

    /// Tripped on shutdown to end any running proof search
    pub shutdown: StopSignal,
}

impl AppState {
    pub fn new(ledger: Ledger, peer_timeout: Duration) -> Self {
        AppState {
            ledger,
            peers: PeerRegistry::new(),
            resolver: ConsensusResolver::new(HttpChainFetcher::new(peer_timeout)),
            shutdown: StopSignal::new(),
        }
    }
}

/// Reasons a transaction submission is turned away
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransactionRequestError {
    #[error("No transaction body supplied")]
    EmptyBody,

    #[error("Missing values: {}", .0.join(", "))]
    MissingField(Vec<&'static str>),

    #[error("Malformed transaction body: {0}")]
    MalformedBody(String),
}

/// Request for the transaction endpoint
///
/// Every field is optional here so that absent fields can be reported by
/// name instead of failing deserialization as a whole.
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct TransactionRequest {
    /// The sender's address
    pub sender: Option<String>,

    /// The recipient's address
    pub recipient: Option<String>,

    /// The amount to transfer
    #[schema(value_type = Option<f64>)]
    pub amount: Option<Number>,
}

impl TransactionRequest {
    /// Parses and validates a raw request body
    ///
    /// An absent body and `null` count as no body at all; an object without
    /// the required keys reports each missing one.
    pub fn parse(body: &[u8]) -> Result<Transaction, TransactionRequestError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(TransactionRequestError::EmptyBody);
        }

        let value: Value = serde_json::from_slice(body)
            .map_err(|err| TransactionRequestError::MalformedBody(err.to_string()))?;

        match &value {
            Value::Null => return Err(TransactionRequestError::EmptyBody),
            Value::Object(_) => {}
            _ => {
                return Err(TransactionRequestError::MalformedBody(
                    "expected a JSON object".to_string(),
                ))
            }
        }

        let request: TransactionRequest = serde_json::from_value(value)
            .map_err(|err| TransactionRequestError::MalformedBody(err.to_string()))?;
        request.validate()
    }

    /// Checks that all required fields are present
    pub fn validate(self) -> Result<Transaction, TransactionRequestError> {
        match (self.sender, self.recipient, self.amount) {
            (Some(sender), Some(recipient), Some(amount)) => {
                Ok(Transaction::new(sender, recipient, amount))
            }
            (sender, recipient, amount) => {
                let mut missing = Vec::new();
                if sender.is_none() {
                    missing.push("sender");
                }
                if recipient.is_none() {
                    missing.push("recipient");
                }
                if amount.is_none() {
                    missing.push("amount");
                }
                Err(TransactionRequestError::MissingField(missing))
            }
        }
    }
}

/// Response for the transaction endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    /// The message
    pub message: String,

    /// The index of the block that will include this transaction
    pub block_index: u64,
}

/// Response for the mine endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MineResponse {
    /// The message
    pub message: String,

    /// Index of the new block
    pub index: u64,

    /// Transactions sealed into the new block
    pub transactions: Vec<Transaction>,

    /// Proof of work of the new block
    pub proof: u64,

    /// Hash of the block it extends
    #[schema(value_type = String)]
    pub previous_hash: PreviousHash,
}

impl From<Block> for MineResponse {
    fn from(block: Block) -> Self {
        MineResponse {
            message: "New Block Forged".to_string(),
            index: block.index,
            transactions: block.transactions,
            proof: block.proof,
            previous_hash: block.previous_hash,
        }
    }
}

/// Response for the validate endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ValidateResponse {
    /// Whether the chain is valid
    pub valid: bool,

    /// The length of the chain
    pub length: usize,
}

/// Request for the node registration endpoint
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct RegisterNodesRequest {
    /// Peer addresses, e.g. `http://192.168.0.5:5000`
    pub nodes: Option<Vec<String>>,
}

/// Response listing the known peers
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NodesResponse {
    /// The message
    pub message: String,

    /// All peers known after the request
    pub total_nodes: Vec<String>,
}

/// Response for the consensus endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResolveResponse {
    /// The message
    pub message: String,

    /// Whether the local chain was replaced
    pub replaced: bool,

    /// The chain held after resolution
    pub chain: Vec<Block>,
}
