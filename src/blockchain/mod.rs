// Blockchain module
//
// This module contains the core ledger implementation including:
// - Transaction structure
// - Block structure and its canonical hash
// - Proof of work puzzle
// - Ledger holding the chain and the pending transactions

pub mod block;
pub mod chain;
pub mod hasher;
pub mod proof;
pub mod transaction;

// Re-export main components for easier access
pub use block::{Block, PreviousHash};
pub use chain::{ChainSnapshot, Ledger, LedgerError};
pub use proof::{ProofOfWork, StopSignal, DEFAULT_DIFFICULTY};
pub use transaction::Transaction;
