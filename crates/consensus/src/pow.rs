//! Proof of Work (PoW) nonce search.
//!
//! Starting at nonce 0, each attempt hashes
//! `prev_hash ++ merkle_root ++ timestamp ++ nonce` with a single SHA-256
//! round. The first hash with at least `difficulty` leading hex zeros wins.
//! Expected attempts grow as 16^difficulty and the search is unbounded, so
//! the stop signal is polled every [`STOP_CHECK_INTERVAL`] nonces.

use crate::stop::StopSignal;
use crate::{ConsensusError, Result};
use blocksim_core::{digest, BlockHeader, Hash, HashMode, HeaderTarget, BLOCK_VERSION};
use tracing::{trace, warn};

/// A 64-character hex digest cannot carry more leading zeros than this.
pub const MAX_DIFFICULTY: u32 = 64;

/// Nonces tried between two polls of the stop signal.
pub const STOP_CHECK_INTERVAL: u64 = 1024;

const PROGRESS_INTERVAL: u64 = 1 << 16;

/// Proof of Work configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoWConfig {
    /// Required leading hex zeros.
    pub difficulty: u32,
}

impl Default for PoWConfig {
    fn default() -> Self {
        Self { difficulty: 1 }
    }
}

impl PoWConfig {
    /// Create a configuration, rejecting unreachable difficulties.
    pub fn new(difficulty: u32) -> Result<Self> {
        if difficulty > MAX_DIFFICULTY {
            return Err(ConsensusError::DifficultyTooHigh {
                difficulty,
                max: MAX_DIFFICULTY,
            });
        }
        Ok(Self { difficulty })
    }

    /// Mine a header with this configuration's difficulty.
    pub fn mine(
        &self,
        prev_hash: Hash,
        merkle_root: Hash,
        timestamp: u64,
        stop: &StopSignal,
    ) -> Result<BlockHeader> {
        mine_header(prev_hash, merkle_root, timestamp, self.difficulty, stop)
    }
}

/// Check the difficulty predicate.
pub fn meets_difficulty(hash: &Hash, difficulty: u32) -> bool {
    hash.leading_zero_nibbles() >= difficulty
}

/// Search nonces until the header hash meets `difficulty`.
///
/// Returns [`ConsensusError::Aborted`] if `stop` is raised before a nonce
/// is found; the partial search is discarded.
pub fn mine_header(
    prev_hash: Hash,
    merkle_root: Hash,
    timestamp: u64,
    difficulty: u32,
    stop: &StopSignal,
) -> Result<BlockHeader> {
    if difficulty > MAX_DIFFICULTY {
        return Err(ConsensusError::DifficultyTooHigh {
            difficulty,
            max: MAX_DIFFICULTY,
        });
    }

    let mut nonce: u64 = 0;
    loop {
        let preimage = BlockHeader::pow_preimage(&prev_hash, &merkle_root, timestamp, nonce);
        let hash = digest(HashMode::Single, preimage.as_bytes());

        if meets_difficulty(&hash, difficulty) {
            trace!(nonce, %hash, "nonce found");
            return Ok(BlockHeader {
                version: BLOCK_VERSION,
                prev_hash,
                merkle_root,
                timestamp,
                nonce,
                target: HeaderTarget::Difficulty(difficulty),
                hash,
            });
        }

        nonce = nonce.wrapping_add(1);

        if nonce % STOP_CHECK_INTERVAL == 0 && stop.is_raised() {
            warn!(nonce, difficulty, "nonce search aborted");
            return Err(ConsensusError::Aborted);
        }
        if nonce % PROGRESS_INTERVAL == 0 {
            trace!(nonce, difficulty, "mining in progress");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difficulty_zero_accepts_first_nonce() {
        let header = mine_header(Hash::ZERO, Hash::ZERO, 1, 0, &StopSignal::new()).unwrap();
        assert_eq!(header.nonce, 0);

        let preimage = BlockHeader::pow_preimage(&Hash::ZERO, &Hash::ZERO, 1, 0);
        assert_eq!(header.hash, digest(HashMode::Single, preimage.as_bytes()));
    }

    #[test]
    fn test_mined_header_meets_difficulty() {
        let merkle_root = digest(HashMode::Single, b"payload");
        for difficulty in 1..=3 {
            let header =
                mine_header(Hash::ZERO, merkle_root, 1_700_000_000, difficulty, &StopSignal::new())
                    .unwrap();
            assert!(header.hash.to_hex().starts_with(&"0".repeat(difficulty as usize)));
            assert!(header.is_valid());
            assert_eq!(header.target, HeaderTarget::Difficulty(difficulty));
        }
    }

    #[test]
    fn test_nonce_is_first_solution() {
        let merkle_root = digest(HashMode::Single, b"first");
        let header = mine_header(Hash::ZERO, merkle_root, 5, 2, &StopSignal::new()).unwrap();

        for nonce in 0..header.nonce {
            let preimage = BlockHeader::pow_preimage(&Hash::ZERO, &merkle_root, 5, nonce);
            assert!(!meets_difficulty(&digest(HashMode::Single, preimage.as_bytes()), 2));
        }
    }

    #[test]
    fn test_raised_stop_aborts_search() {
        let stop = StopSignal::new();
        stop.raise();
        // Unreachable in practice, so only the stop signal can end it.
        let result = mine_header(Hash::ZERO, Hash::ZERO, 1, 40, &stop);
        assert!(matches!(result, Err(ConsensusError::Aborted)));
    }

    #[test]
    fn test_difficulty_bounds() {
        assert!(PoWConfig::new(MAX_DIFFICULTY).is_ok());
        assert!(matches!(
            PoWConfig::new(MAX_DIFFICULTY + 1),
            Err(ConsensusError::DifficultyTooHigh { .. })
        ));
    }

    #[test]
    fn test_meets_difficulty() {
        assert!(meets_difficulty(&Hash::ZERO, MAX_DIFFICULTY));
        assert!(meets_difficulty(&Hash([0xff; 32]), 0));
        assert!(!meets_difficulty(&Hash([0xff; 32]), 1));
    }
}
