use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;

use super::hasher::sha256_hex;

/// Number of leading zero hex characters a proof hash needs by default
pub const DEFAULT_DIFFICULTY: usize = 4;

/// Cooperative cancellation token for a running proof search
///
/// Clones share the same flag, so one clone can be handed to the search
/// while another is kept to stop it.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks every search observing this signal to give up
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Proof-of-work puzzle over pairs of consecutive proofs
///
/// A proof is valid when `sha256("{last_proof}{proof}")` starts with
/// `difficulty` zero characters in hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofOfWork {
    difficulty: usize,
}

impl Default for ProofOfWork {
    fn default() -> Self {
        ProofOfWork::new(DEFAULT_DIFFICULTY)
    }
}

impl ProofOfWork {
    pub fn new(difficulty: usize) -> Self {
        ProofOfWork { difficulty }
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    /// Checks whether `proof` solves the puzzle posed by `last_proof`
    ///
    /// # Arguments
    ///
    /// * `last_proof` - The proof of the previous block
    /// * `proof` - The candidate proof
    ///
    /// # Returns
    ///
    /// true if the hash of the concatenated decimal proofs has enough leading zeros
    pub fn is_valid(&self, last_proof: u64, proof: u64) -> bool {
        let guess = format!("{last_proof}{proof}");
        let guess_hash = sha256_hex(guess.as_bytes());

        guess_hash.len() >= self.difficulty
            && guess_hash[..self.difficulty].bytes().all(|b| b == b'0')
    }

    /// Finds the smallest proof that solves the puzzle for `last_proof`
    ///
    /// Counts up from zero. The search is CPU bound and unbounded, so callers
    /// that need to bound it hold a clone of `stop`.
    ///
    /// # Returns
    ///
    /// The proof, or None if the search was stopped first
    pub fn search(&self, last_proof: u64, stop: &StopSignal) -> Option<u64> {
        let mut proof = 0u64;

        while !self.is_valid(last_proof, proof) {
            if stop.is_stopped() {
                debug!("Proof search for {} stopped at {}", last_proof, proof);
                return None;
            }
            proof += 1;
        }

        Some(proof)
    }
}
