//! Core block primitives for blocksim.
//!
//! This crate provides the fundamental types used throughout the simulator:
//! - SHA-256 hashing in single or double round mode
//! - Simulated transactions (opaque random payloads)
//! - Blocks and block headers
//! - Merkle roots

pub mod block;
pub mod hash;
pub mod merkle;
pub mod transaction;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// Re-export commonly used types at the crate root
pub use block::{Block, BlockHeader, HeaderTarget, BLOCK_VERSION};
pub use hash::{digest, digest_hex, Hash, HashMode, H256};
pub use merkle::{merkle_levels, merkle_root};
pub use transaction::Transaction;

/// Errors raised by the core primitives.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("merkle root requires at least one transaction")]
    EmptyTransactions,
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// The consensus discipline a chain runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConsensusKind {
    /// Nonce search against a leading-zero difficulty target.
    ProofOfWork,
    /// Instant sealing, optionally after a validation delay.
    ProofOfAuthority,
}

impl ConsensusKind {
    /// The hashing rule fixed for this consensus variant.
    pub fn hash_mode(&self) -> HashMode {
        match self {
            ConsensusKind::ProofOfWork => HashMode::Single,
            ConsensusKind::ProofOfAuthority => HashMode::Double,
        }
    }

    /// Short label used in logs and tables.
    pub fn label(&self) -> &'static str {
        match self {
            ConsensusKind::ProofOfWork => "PoW",
            ConsensusKind::ProofOfAuthority => "PoA",
        }
    }
}

impl fmt::Display for ConsensusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
