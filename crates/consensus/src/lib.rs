//! Block header sealing for blocksim.
//!
//! This crate provides the two consensus disciplines the simulator models:
//! - Proof of Authority: instant sealing after an optional validation delay
//! - Proof of Work: an unbounded nonce search against a leading-zero target
//!
//! Both observe a shared [`StopSignal`] so a run can be cancelled while a
//! delay is elapsing or a search is in flight.
//!
//! # Example
//!
//! ```rust
//! use blocksim_consensus::{Consensus, PoWConfig, StopSignal};
//! use blocksim_core::{BlockHeader, Hash};
//!
//! let consensus = Consensus::Work(PoWConfig::new(2).unwrap());
//! let stop = StopSignal::new();
//!
//! consensus.prepare(&stop).unwrap();
//! let header = consensus
//!     .seal(Hash::ZERO, Hash::ZERO, BlockHeader::current_timestamp(), &stop)
//!     .unwrap();
//! assert!(header.hash.to_hex().starts_with("00"));
//! ```

pub mod poa;
pub mod pow;
pub mod stop;
pub mod validator;

use blocksim_core::{BlockHeader, ConsensusKind, Hash, HashMode};
use thiserror::Error;

// Re-export commonly used types
pub use poa::{seal_header, PoAConfig, DEFAULT_BITS};
pub use pow::{meets_difficulty, mine_header, PoWConfig, MAX_DIFFICULTY};
pub use stop::StopSignal;
pub use validator::{BlockValidator, ValidationError};

/// Errors that can occur while sealing a header.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("header construction aborted by stop signal")]
    Aborted,

    #[error("difficulty {difficulty} exceeds maximum of {max}")]
    DifficultyTooHigh { difficulty: u32, max: u32 },
}

pub type Result<T> = std::result::Result<T, ConsensusError>;

/// The active consensus engine of a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Consensus {
    Authority(PoAConfig),
    Work(PoWConfig),
}

impl Consensus {
    pub fn kind(&self) -> ConsensusKind {
        match self {
            Consensus::Authority(_) => ConsensusKind::ProofOfAuthority,
            Consensus::Work(_) => ConsensusKind::ProofOfWork,
        }
    }

    pub fn hash_mode(&self) -> HashMode {
        self.kind().hash_mode()
    }

    /// Work done before the block's contents are assembled.
    ///
    /// PoA waits out its validation delay here; PoW has nothing to do.
    pub fn prepare(&self, stop: &StopSignal) -> Result<()> {
        match self {
            Consensus::Authority(config) => config.await_validation(stop),
            Consensus::Work(_) => Ok(()),
        }
    }

    /// Produce a finished header for the given parent and contents.
    pub fn seal(
        &self,
        prev_hash: Hash,
        merkle_root: Hash,
        timestamp: u64,
        stop: &StopSignal,
    ) -> Result<BlockHeader> {
        match self {
            Consensus::Authority(config) => Ok(config.seal(prev_hash, merkle_root, timestamp)),
            Consensus::Work(config) => config.mine(prev_hash, merkle_root, timestamp, stop),
        }
    }
}

impl Default for Consensus {
    fn default() -> Self {
        Consensus::Authority(PoAConfig::default())
    }
}
