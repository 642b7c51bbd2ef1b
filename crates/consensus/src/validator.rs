//! Block validation rules.
//!
//! These re-check blocks after the fact: header hash integrity, the PoW
//! target, merkle roots, and linkage to a parent.

use blocksim_core::{Block, Hash, HashMode, HeaderTarget};
use thiserror::Error;

/// Errors that can occur during validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("block height mismatch (expected {expected}, got {got})")]
    InvalidHeight { expected: u64, got: u64 },

    #[error("block prev_hash mismatch at height {height}")]
    InvalidPrevHash { height: u64 },

    #[error("genesis block must reference the zero hash")]
    InvalidGenesis,

    #[error("header hash does not match header fields at height {height}")]
    HeaderHashMismatch { height: u64 },

    #[error("header hash misses difficulty {difficulty} at height {height}")]
    DifficultyNotMet { height: u64, difficulty: u32 },

    #[error("block merkle root verification failed at height {height}")]
    InvalidMerkleRoot { height: u64 },

    #[error("block at height {height} contains no transactions")]
    EmptyBlock { height: u64 },

    #[error("tx_count {claimed} disagrees with {actual} transactions at height {height}")]
    TxCountMismatch {
        height: u64,
        claimed: usize,
        actual: usize,
    },
}

pub type Result<T> = std::result::Result<T, ValidationError>;

/// Block validator.
pub struct BlockValidator;

impl BlockValidator {
    /// Validate header integrity and block contents.
    pub fn validate_block_structure(block: &Block, mode: HashMode) -> Result<()> {
        let height = block.height;

        if block.transactions.is_empty() {
            return Err(ValidationError::EmptyBlock { height });
        }

        if block.tx_count != block.transactions.len() {
            return Err(ValidationError::TxCountMismatch {
                height,
                claimed: block.tx_count,
                actual: block.transactions.len(),
            });
        }

        if block.header.hash != block.header.compute_hash() {
            return Err(ValidationError::HeaderHashMismatch { height });
        }

        if let HeaderTarget::Difficulty(difficulty) = block.header.target {
            if !crate::meets_difficulty(&block.header.hash, difficulty) {
                return Err(ValidationError::DifficultyNotMet { height, difficulty });
            }
        }

        if !block.verify_merkle_root(mode) {
            return Err(ValidationError::InvalidMerkleRoot { height });
        }

        Ok(())
    }

    /// Validate a block is a well-formed genesis block.
    pub fn validate_genesis(block: &Block) -> Result<()> {
        if block.height != 0 {
            return Err(ValidationError::InvalidHeight {
                expected: 0,
                got: block.height,
            });
        }
        if block.header.prev_hash != Hash::ZERO {
            return Err(ValidationError::InvalidGenesis);
        }
        Ok(())
    }

    /// Validate block extends the parent correctly.
    pub fn validate_block_extends_parent(
        block: &Block,
        parent_hash: Hash,
        parent_height: u64,
    ) -> Result<()> {
        if block.height != parent_height + 1 {
            return Err(ValidationError::InvalidHeight {
                expected: parent_height + 1,
                got: block.height,
            });
        }

        if block.header.prev_hash != parent_hash {
            return Err(ValidationError::InvalidPrevHash {
                height: block.height,
            });
        }

        Ok(())
    }

    /// Full block validation against an optional parent.
    ///
    /// `None` means the block must be a genesis block.
    pub fn validate_full(block: &Block, parent: Option<&Block>, mode: HashMode) -> Result<()> {
        Self::validate_block_structure(block, mode)?;
        match parent {
            Some(parent) => {
                Self::validate_block_extends_parent(block, parent.hash(), parent.height)
            }
            None => Self::validate_genesis(block),
        }
    }
}
