//! Block and block header structures.

use crate::hash::{digest, Hash, HashMode};
use crate::merkle::merkle_root;
use crate::transaction::Transaction;
use crate::ConsensusKind;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Header version stamped on every block.
pub const BLOCK_VERSION: u32 = 1;

/// The mode-dependent target field of a header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderTarget {
    /// Compact bits string carried by authority blocks.
    Bits(String),
    /// Required number of leading hex zeros for work blocks.
    Difficulty(u32),
}

/// The header of a block containing metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Header format version.
    pub version: u32,
    /// Hash of the previous block (`Hash::ZERO` for genesis).
    pub prev_hash: Hash,
    /// Merkle root of transactions.
    pub merkle_root: Hash,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Nonce that produced `hash` (always 0 for PoA).
    pub nonce: u64,
    /// Bits or difficulty, depending on consensus.
    pub target: HeaderTarget,
    /// Digest of the other fields under the consensus hashing rule.
    pub hash: Hash,
}

impl BlockHeader {
    /// Preimage hashed by authority headers.
    pub fn poa_preimage(
        version: u32,
        prev_hash: &Hash,
        merkle_root: &Hash,
        timestamp: u64,
        bits: &str,
    ) -> String {
        format!(
            "{}{}{}{}{}",
            version,
            prev_hash.to_hex(),
            merkle_root.to_hex(),
            timestamp,
            bits
        )
    }

    /// Preimage hashed for one proof-of-work attempt.
    pub fn pow_preimage(prev_hash: &Hash, merkle_root: &Hash, timestamp: u64, nonce: u64) -> String {
        format!(
            "{}{}{}{}",
            prev_hash.to_hex(),
            merkle_root.to_hex(),
            timestamp,
            nonce
        )
    }

    /// Which consensus produced this header.
    pub fn kind(&self) -> ConsensusKind {
        match self.target {
            HeaderTarget::Bits(_) => ConsensusKind::ProofOfAuthority,
            HeaderTarget::Difficulty(_) => ConsensusKind::ProofOfWork,
        }
    }

    /// Recompute the header hash from its fields.
    pub fn compute_hash(&self) -> Hash {
        let mode = self.kind().hash_mode();
        let preimage = match &self.target {
            HeaderTarget::Bits(bits) => Self::poa_preimage(
                self.version,
                &self.prev_hash,
                &self.merkle_root,
                self.timestamp,
                bits,
            ),
            HeaderTarget::Difficulty(_) => {
                Self::pow_preimage(&self.prev_hash, &self.merkle_root, self.timestamp, self.nonce)
            }
        };
        digest(mode, preimage.as_bytes())
    }

    /// Check the cached hash against the fields and, for PoW, the target.
    pub fn is_valid(&self) -> bool {
        if self.hash != self.compute_hash() {
            return false;
        }
        match self.target {
            HeaderTarget::Bits(_) => true,
            HeaderTarget::Difficulty(difficulty) => self.hash.leading_zero_nibbles() >= difficulty,
        }
    }

    /// Get the current Unix timestamp.
    pub fn current_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }
}

/// A complete block: header plus its transaction payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block height (0 for genesis).
    pub height: u64,
    /// Total payload bytes across all transactions.
    pub size: usize,
    /// Block header.
    pub header: BlockHeader,
    /// Number of transactions.
    pub tx_count: usize,
    /// Transactions in order.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Pair a sealed header with the transactions it commits to.
    pub fn new(height: u64, header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        let size = transactions.iter().map(Transaction::len).sum();
        Self {
            height,
            size,
            header,
            tx_count: transactions.len(),
            transactions,
        }
    }

    /// Get the block hash (hash of the header).
    pub fn hash(&self) -> Hash {
        self.header.hash
    }

    /// Get the block height.
    pub fn height(&self) -> u64 {
        self.height
    }

    /// Check if this is the genesis block.
    pub fn is_genesis(&self) -> bool {
        self.height == 0 && self.header.prev_hash == Hash::ZERO
    }

    /// Get the number of transactions in this block.
    pub fn tx_count(&self) -> usize {
        self.tx_count
    }

    /// Verify the merkle root matches the transactions.
    pub fn verify_merkle_root(&self, mode: HashMode) -> bool {
        match merkle_root(mode, &self.transactions) {
            Ok(root) => root == self.header.merkle_root,
            Err(_) => false,
        }
    }
}
