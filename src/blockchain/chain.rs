use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::block::{Block, PreviousHash};
use super::proof::{ProofOfWork, StopSignal};
use super::transaction::Transaction;

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Mining was cancelled before a proof was found")]
    MiningCancelled,

}

/// A copy of the chain taken at one instant, in the shape nodes exchange
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChainSnapshot {
    /// The blocks in the chain
    pub chain: Vec<Block>,

    /// The length of the chain
    pub length: usize,
}

/// Represents the ledger of a single node
///
/// The chain and the pending transactions sit behind separate locks. Proof
/// searches run with no lock held; the chain's write lock is only taken for
/// the final append or for a wholesale replacement, so readers never see a
/// half-applied update.
#[derive(Debug)]
pub struct Ledger {
    /// The chain of blocks
    chain: RwLock<Vec<Block>>,

    /// Pending transactions to be included in the next block
    pending_transactions: Mutex<Vec<Transaction>>,

    /// Identity credited with mining rewards
    node_id: String,

    /// Puzzle every block's proof has to solve
    pow: ProofOfWork,
}

impl Ledger {
    /// Creates a new ledger holding only the genesis block
    pub fn with_pow(node_id: impl Into<String>, pow: ProofOfWork) -> Self {
        Ledger {
            chain: RwLock::new(vec![Block::genesis()]),
            pending_transactions: Mutex::new(Vec::new()),
            node_id: node_id.into(),
            pow,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn difficulty(&self) -> usize {
        self.pow.difficulty()
    }

    /// Gets the last block in the chain
    pub fn last_block(&self) -> Block {
        let chain = self.chain.read();
        chain.last().cloned().unwrap_or_else(Block::genesis)
    }

    /// Adds a new transaction to the pending transactions
    ///
    /// # Returns
    ///
    /// The index of the block that will include this transaction
    pub fn append_transaction(
        &self,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: impl Into<serde_json::Number>,
    ) -> u64 {
        let transaction = Transaction::new(sender, recipient, amount);

        // Holding the chain lock keeps a concurrent mine from draining the
        // buffer between reading the length and queueing the transaction.
        let chain = self.chain.read();
        let next_index = chain.len() as u64 + 1;

        debug!(
            "Queued transaction {} -> {} for block {}",
            transaction.sender, transaction.recipient, next_index
        );
        self.pending_transactions.lock().push(transaction);

        next_index
    }

    /// Mines a new block, giving up if `stop` is tripped during the search
    ///
    /// The search runs against a snapshot of the last block. If the chain
    /// tip changed by the time a proof is found, the proof no longer links
    /// up and the search starts again from the new tip.
    ///
    /// # Returns
    ///
    /// Result with the newly mined block
    pub fn mine_block_with(&self, stop: &StopSignal) -> Result<Block, LedgerError> {
        loop {
            let last_block = self.last_block();
            let proof = self
                .pow
                .search(last_block.proof, stop)
                .ok_or(LedgerError::MiningCancelled)?;
            let previous_hash = last_block.hash()?;

            let mut chain = self.chain.write();
            if chain.last() != Some(&last_block) {
                warn!(
                    "Chain tip moved while mining on block {}, searching again",
                    last_block.index
                );
                continue;
            }

            let transactions = {
                let mut pending = self.pending_transactions.lock();
                pending.push(Transaction::reward(&self.node_id));
                std::mem::take(&mut *pending)
            };

            let block = Block::new(
                last_block.index + 1,
                transactions,
                proof,
                PreviousHash::Hash(previous_hash),
            );
            chain.push(block.clone());

            info!(
                "Mined block {} with proof {} ({} transactions)",
                block.index,
                block.proof,
                block.transactions.len()
            );
            return Ok(block);
        }
    }

    /// Gets the entire chain together with its length
    pub fn current_chain(&self) -> ChainSnapshot {
        let chain = self.chain.read().clone();
        ChainSnapshot {
            length: chain.len(),
            chain,
        }
    }

    /// Number of blocks in the chain
    pub fn height(&self) -> usize {
        self.chain.read().len()
    }

    /// Gets all pending transactions
    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.pending_transactions.lock().clone()
    }

    /// Validates a candidate chain
    ///
    /// Every block after the first must carry the next index, name the hash
    /// of its predecessor and carry a proof that solves the puzzle posed by
    /// the predecessor's proof.
    /// Chains of zero or one block are valid.
    pub fn is_chain_valid(&self, chain: &[Block]) -> bool {
        for pair in chain.windows(2) {
            let (previous, current) = (&pair[0], &pair[1]);

            let expected = match previous.hash() {
                Ok(hash) => PreviousHash::Hash(hash),
                Err(err) => {
                    warn!("Could not hash block {}: {}", previous.index, err);
                    return false;
                }
            };

            if current.index != previous.index + 1 {
                debug!(
                    "Block {} does not follow block {}",
                    current.index, previous.index
                );
                return false;
            }

            if current.previous_hash != expected {
                debug!("Block {} does not link to its predecessor", current.index);
                return false;
            }

            if !self.pow.is_valid(previous.proof, current.proof) {
                debug!("Block {} carries an invalid proof", current.index);
                return false;
            }
        }

        true
    }

    /// Validates the ledger's own chain
    pub fn is_valid(&self) -> bool {
        let chain = self.chain.read();
        self.is_chain_valid(&chain)
    }

    /// Replaces the chain if the candidate is longer than the current one
    ///
    /// The length check and the swap happen under one write lock, so a block
    /// mined in the meantime is never discarded for a chain that is no longer
    /// longer. The candidate must already have been validated.
    ///
    /// # Returns
    ///
    /// true if the chain was replaced
    pub fn replace_chain(&self, candidate: Vec<Block>) -> bool {
        let mut chain = self.chain.write();
        if candidate.len() <= chain.len() {
            debug!(
                "Keeping local chain of {} blocks over candidate of {}",
                chain.len(),
                candidate.len()
            );
            return false;
        }

        info!(
            "Replacing chain of {} blocks with chain of {}",
            chain.len(),
            candidate.len()
        );
        *chain = candidate;
        true
    }
}

#[cfg(test)]
impl Ledger {
    /// Mines a new block, blocking until a proof is found
    pub(crate) fn mine_block(&self) -> Result<Block, LedgerError> {
        self.mine_block_with(&StopSignal::new())
    }

    /// Creates a ledger that starts from `chain` as is
    pub(crate) fn with_chain(node_id: &str, pow: ProofOfWork, chain: Vec<Block>) -> Self {
        let ledger = Ledger::with_pow(node_id, pow);
        *ledger.chain.write() = chain;
        ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::block::GENESIS_PROOF;
    use std::sync::Arc;

    fn quick_ledger(node_id: &str) -> Ledger {
        Ledger::with_pow(node_id, ProofOfWork::new(2))
    }

    #[test]
    fn test_new_ledger() {
        let ledger = Ledger::with_pow("node-1", ProofOfWork::default());
        let snapshot = ledger.current_chain();

        assert_eq!(snapshot.length, 1);
        assert_eq!(snapshot.chain[0].index, 1);
        assert_eq!(snapshot.chain[0].proof, GENESIS_PROOF);
        assert_eq!(snapshot.chain[0].previous_hash, PreviousHash::Genesis);
        assert_eq!(ledger.difficulty(), 4);
        assert!(ledger.pending_transactions().is_empty());
    }

    #[test]
    fn test_append_transaction() {
        let ledger = Ledger::with_pow("node-1", ProofOfWork::default());

        let block_index = ledger.append_transaction("a", "b", 5u64);

        assert_eq!(block_index, 2);
        let pending = ledger.pending_transactions();
        assert_eq!(pending, vec![Transaction::new("a", "b", 5u64)]);
        assert_eq!(ledger.current_chain().length, 1);
    }

    #[test]
    fn test_mine_block() {
        let ledger = Ledger::with_pow("node-1", ProofOfWork::default());
        ledger.append_transaction("a", "b", 5u64);

        let block = ledger.mine_block().unwrap();

        assert_eq!(block.index, 2);
        assert_eq!(block.proof, 35293);
        assert_eq!(
            block.transactions,
            vec![Transaction::new("a", "b", 5u64), Transaction::reward("node-1")]
        );
        assert_eq!(
            block.previous_hash,
            PreviousHash::Hash(ledger.current_chain().chain[0].hash().unwrap())
        );
        assert!(ledger.pending_transactions().is_empty());
        assert_eq!(ledger.current_chain().length, 2);
    }

    #[test]
    fn test_mined_chain_is_valid() {
        let ledger = quick_ledger("node-1");
        for i in 0..5u64 {
            ledger.append_transaction("a", "b", i);
            ledger.mine_block().unwrap();
        }

        let snapshot = ledger.current_chain();
        assert_eq!(snapshot.length, 6);
        assert!(ledger.is_chain_valid(&snapshot.chain));
        assert!(ledger.is_valid());
    }

    #[test]
    fn test_short_chains_are_valid() {
        let ledger = quick_ledger("node-1");

        assert!(ledger.is_chain_valid(&[]));
        assert!(ledger.is_chain_valid(&[Block::genesis()]));
    }

    #[test]
    fn test_tampered_proof_is_detected() {
        let ledger = quick_ledger("node-1");
        for _ in 0..3 {
            ledger.mine_block().unwrap();
        }

        for position in 1..4 {
            let mut chain = ledger.current_chain().chain;
            chain[position].proof += 1;
            assert!(!ledger.is_chain_valid(&chain), "block {position}");
        }
    }

    #[test]
    fn test_tampered_previous_hash_is_detected() {
        let ledger = quick_ledger("node-1");
        for _ in 0..3 {
            ledger.mine_block().unwrap();
        }

        for position in 1..4 {
            let mut chain = ledger.current_chain().chain;
            chain[position].previous_hash = PreviousHash::Hash("0".repeat(64));
            assert!(!ledger.is_chain_valid(&chain), "block {position}");
        }
    }

    #[test]
    fn test_tampered_transactions_are_detected() {
        let ledger = quick_ledger("node-1");
        ledger.append_transaction("a", "b", 5u64);
        ledger.mine_block().unwrap();
        ledger.mine_block().unwrap();

        let mut chain = ledger.current_chain().chain;
        chain[1].transactions[0].amount = 500u64.into();

        assert!(!ledger.is_chain_valid(&chain));
    }

    #[test]
    fn test_cancelled_mining_leaves_ledger_untouched() {
        let ledger = Ledger::with_pow("node-1", ProofOfWork::new(64));
        ledger.append_transaction("a", "b", 5u64);
        let stop = StopSignal::new();
        stop.stop();

        let result = ledger.mine_block_with(&stop);

        assert!(matches!(result, Err(LedgerError::MiningCancelled)));
        assert_eq!(ledger.current_chain().length, 1);
        assert_eq!(ledger.pending_transactions().len(), 1);
    }

    #[test]
    fn test_replace_chain_requires_longer_candidate() {
        let ledger = quick_ledger("node-1");
        let other = quick_ledger("node-2");
        other.mine_block().unwrap();

        assert!(!ledger.replace_chain(vec![Block::genesis()]));
        assert!(ledger.replace_chain(other.current_chain().chain));
        assert_eq!(ledger.current_chain().length, 2);
        assert!(!ledger.replace_chain(other.current_chain().chain));
    }

    #[test]
    fn test_index_gap_is_detected() {
        let ledger = quick_ledger("node-1");
        for _ in 0..3 {
            ledger.mine_block().unwrap();
        }

        let mut chain = ledger.current_chain().chain;
        chain[3].index = 9;
        assert!(!ledger.is_chain_valid(&chain));

        let mut chain = ledger.current_chain().chain;
        chain.remove(2);
        assert!(!ledger.is_chain_valid(&chain));
    }

    #[test]
    fn test_replaced_chain_with_bogus_index_is_refused() {
        let ledger = quick_ledger("node-1");
        let other = quick_ledger("node-2");
        other.mine_block().unwrap();
        other.mine_block().unwrap();
        let mut candidate = other.current_chain().chain;
        candidate[2].index = 40;

        assert!(!ledger.is_chain_valid(&candidate));
        assert_eq!(ledger.height(), 1);
    }

    #[test]
    fn test_append_index_tracks_concurrent_mining() {
        let ledger = Arc::new(quick_ledger("node-1"));
        let miner = {
            let ledger = Arc::clone(&ledger);
            std::thread::spawn(move || {
                for _ in 0..20 {
                    ledger.mine_block().unwrap();
                }
            })
        };

        for i in 0..200u64 {
            let block_index = ledger.append_transaction("a", "b", i);
            let landed = loop {
                let chain = ledger.current_chain().chain;
                if let Some(block) = chain
                    .iter()
                    .find(|block| block.transactions.contains(&Transaction::new("a", "b", i)))
                {
                    break Some(block.index);
                }
                if miner.is_finished() {
                    break None;
                }
            };
            if let Some(index) = landed {
                assert_eq!(index, block_index, "transaction {i}");
            }
        }

        miner.join().unwrap();
    }

    #[test]
    fn test_reads_proceed_while_mining() {
        let ledger = Arc::new(Ledger::with_pow("node-1", ProofOfWork::new(64)));
        let stop = StopSignal::new();
        let miner = {
            let ledger = Arc::clone(&ledger);
            let stop = stop.clone();
            std::thread::spawn(move || ledger.mine_block_with(&stop))
        };

        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(ledger.current_chain().length, 1);
        assert_eq!(ledger.append_transaction("a", "b", 1u64), 2);

        stop.stop();
        assert!(matches!(
            miner.join().unwrap(),
            Err(LedgerError::MiningCancelled)
        ));
    }

    #[test]
    fn test_mining_extends_replaced_chain() {
        let ledger = quick_ledger("node-1");
        let longer = quick_ledger("node-2");
        longer.mine_block().unwrap();
        longer.mine_block().unwrap();

        assert!(ledger.replace_chain(longer.current_chain().chain));
        let block = ledger.mine_block().unwrap();

        assert_eq!(block.index, 4);
        assert!(ledger.is_valid());
    }
}
