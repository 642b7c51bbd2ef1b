//! A single append-only chain and its block timings.
//!
//! A chain is either empty or populated. `create_genesis` is the only way
//! out of the empty state; `add_block` then extends the tip one block at a
//! time. Every append is linkage-checked and records how long the block
//! took to build.

use crate::stats::{self, ChainStats};
use blocksim_consensus::{BlockValidator, Consensus, ConsensusError, StopSignal, ValidationError};
use blocksim_core::{merkle_root, Block, BlockHeader, ConsensusKind, CoreError, Hash, Transaction};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during chain operations.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("linkage violation at height {height}: expected prev_hash {expected}, got {got}")]
    Linkage {
        height: u64,
        expected: Hash,
        got: Hash,
    },

    #[error("height mismatch (expected {expected}, got {got})")]
    HeightMismatch { expected: u64, got: u64 },

    #[error("chain has no genesis block")]
    EmptyChain,

    #[error("genesis block already exists")]
    AlreadyInitialized,

    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    #[error("block error: {0}")]
    Core(#[from] CoreError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl ChainError {
    /// Whether this is a cancelled header search rather than a failure.
    pub fn is_aborted(&self) -> bool {
        matches!(self, ChainError::Consensus(ConsensusError::Aborted))
    }
}

pub type Result<T> = std::result::Result<T, ChainError>;

/// Identifier of a chain within a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId(pub u32);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chain-{}", self.0)
    }
}

/// An in-memory chain of blocks under one consensus discipline.
#[derive(Debug, Clone)]
pub struct Chain {
    id: ChainId,
    consensus: Consensus,
    blocks: Vec<Block>,
    block_times: Vec<Duration>,
}

impl Chain {
    /// Create an empty chain.
    pub fn new(id: ChainId, consensus: Consensus) -> Self {
        Self {
            id,
            consensus,
            blocks: Vec::new(),
            block_times: Vec::new(),
        }
    }

    pub fn id(&self) -> ChainId {
        self.id
    }

    pub fn kind(&self) -> ConsensusKind {
        self.consensus.kind()
    }

    pub fn consensus(&self) -> &Consensus {
        &self.consensus
    }

    /// Replace delay or difficulty for future blocks.
    ///
    /// The consensus kind of a populated chain cannot change, since its
    /// hashing rule is fixed; such a request is ignored and returns false.
    pub fn set_consensus(&mut self, consensus: Consensus) -> bool {
        if !self.blocks.is_empty() && consensus.kind() != self.kind() {
            return false;
        }
        self.consensus = consensus;
        true
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Number of blocks, genesis included.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Height of the tip, if any.
    pub fn height(&self) -> Option<u64> {
        self.last_block().map(Block::height)
    }

    /// Height the next appended block will get.
    pub fn next_height(&self) -> u64 {
        self.blocks.len() as u64
    }

    /// Build the genesis block. Only valid on an empty chain.
    pub fn create_genesis(&mut self, tx_size: usize, stop: &StopSignal) -> Result<Duration> {
        if !self.blocks.is_empty() {
            return Err(ChainError::AlreadyInitialized);
        }
        self.append_new(0, Hash::ZERO, tx_size, stop)
    }

    /// Build and append the next block on top of the tip.
    ///
    /// `tx_size` sets both the transaction count and each transaction's
    /// byte length. Returns the wall-clock time the block took.
    pub fn add_block(&mut self, tx_size: usize, stop: &StopSignal) -> Result<Duration> {
        let tip = self.last_block().ok_or(ChainError::EmptyChain)?;
        let height = tip.height + 1;
        let prev_hash = tip.hash();
        self.append_new(height, prev_hash, tx_size, stop)
    }

    fn append_new(
        &mut self,
        height: u64,
        prev_hash: Hash,
        tx_size: usize,
        stop: &StopSignal,
    ) -> Result<Duration> {
        let start = Instant::now();

        self.consensus.prepare(stop)?;

        let timestamp = BlockHeader::current_timestamp();
        let transactions = Transaction::batch(tx_size);
        let merkle_root = merkle_root(self.consensus.hash_mode(), &transactions)?;
        let header = self.consensus.seal(prev_hash, merkle_root, timestamp, stop)?;
        let block = Block::new(height, header, transactions);

        let elapsed = start.elapsed();
        self.append(block, elapsed)?;
        Ok(elapsed)
    }

    /// Append a finished block, enforcing height and linkage.
    fn append(&mut self, block: Block, elapsed: Duration) -> Result<()> {
        let expected_height = self.next_height();
        if block.height != expected_height {
            return Err(ChainError::HeightMismatch {
                expected: expected_height,
                got: block.height,
            });
        }

        let expected_prev = self.last_block().map(Block::hash).unwrap_or(Hash::ZERO);
        if block.header.prev_hash != expected_prev {
            return Err(ChainError::Linkage {
                height: block.height,
                expected: expected_prev,
                got: block.header.prev_hash,
            });
        }

        let hash = block.hash().to_hex();
        debug!(
            chain = %self.id,
            height = block.height,
            txs = block.tx_count,
            nonce = block.header.nonce,
            hash = &hash[..16],
            elapsed = ?elapsed,
            "block appended"
        );

        self.blocks.push(block);
        self.block_times.push(elapsed);
        Ok(())
    }

    /// The tip, or `None` on an empty chain.
    pub fn last_block(&self) -> Option<&Block> {
        self.blocks.last()
    }

    /// Look up a block by height.
    pub fn block_at(&self, height: u64) -> Option<&Block> {
        usize::try_from(height).ok().and_then(|i| self.blocks.get(i))
    }

    /// Read-only view of all blocks.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// An owned copy of all blocks, detached from the chain.
    pub fn blocks_snapshot(&self) -> Vec<Block> {
        self.blocks.clone()
    }

    /// Creation time of each block, indexed by height.
    pub fn block_times(&self) -> &[Duration] {
        &self.block_times
    }

    /// `(height, creation time)` pairs for plotting.
    pub fn block_time_series(&self) -> Vec<(u64, Duration)> {
        self.blocks
            .iter()
            .zip(&self.block_times)
            .map(|(block, time)| (block.height, *time))
            .collect()
    }

    /// Mean creation time, zero on an empty chain.
    pub fn average_block_time(&self) -> Duration {
        stats::average(&self.block_times)
    }

    /// Aggregate statistics across the whole chain.
    pub fn stats(&self) -> ChainStats {
        let total_transactions = self.blocks.iter().map(Block::tx_count).sum();
        let total_time: Duration = self.block_times.iter().sum();

        ChainStats {
            chain_id: self.id,
            kind: self.kind(),
            blocks: self.blocks.len(),
            total_transactions,
            total_bytes: self.blocks.iter().map(|b| b.size).sum(),
            total_time,
            average_block_time: self.average_block_time(),
            throughput: stats::throughput(total_transactions, total_time),
        }
    }

    /// Re-validate every block and the links between them.
    pub fn verify(&self) -> Result<()> {
        let mode = self.consensus.hash_mode();
        let mut parent: Option<&Block> = None;

        for (i, block) in self.blocks.iter().enumerate() {
            if block.height != i as u64 {
                return Err(ChainError::HeightMismatch {
                    expected: i as u64,
                    got: block.height,
                });
            }
            BlockValidator::validate_full(block, parent, mode)?;
            parent = Some(block);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blocksim_consensus::{PoAConfig, PoWConfig};
    use blocksim_core::HeaderTarget;

    fn poa_chain() -> Chain {
        Chain::new(ChainId(1), Consensus::Authority(PoAConfig::default()))
    }

    fn pow_chain(difficulty: u32) -> Chain {
        Chain::new(ChainId(2), Consensus::Work(PoWConfig { difficulty }))
    }

    fn populate(chain: &mut Chain, blocks: usize, tx_size: usize) {
        let stop = StopSignal::new();
        chain.create_genesis(tx_size, &stop).unwrap();
        for _ in 1..blocks {
            chain.add_block(tx_size, &stop).unwrap();
        }
    }

    #[test]
    fn test_empty_chain() {
        let chain = poa_chain();
        assert!(chain.is_empty());
        assert!(chain.last_block().is_none());
        assert_eq!(chain.height(), None);
        assert_eq!(chain.average_block_time(), Duration::ZERO);
        assert!(chain.verify().is_ok());
    }

    #[test]
    fn test_add_block_requires_genesis() {
        let mut chain = poa_chain();
        let result = chain.add_block(4, &StopSignal::new());
        assert!(matches!(result, Err(ChainError::EmptyChain)));
    }

    #[test]
    fn test_genesis_sentinel() {
        let mut chain = poa_chain();
        chain.create_genesis(3, &StopSignal::new()).unwrap();

        let genesis = chain.last_block().unwrap();
        assert_eq!(genesis.height, 0);
        assert_eq!(genesis.header.prev_hash.to_hex(), "0".repeat(64));
        assert!(genesis.is_genesis());
    }

    #[test]
    fn test_genesis_only_once() {
        let mut chain = poa_chain();
        chain.create_genesis(1, &StopSignal::new()).unwrap();
        assert!(matches!(
            chain.create_genesis(1, &StopSignal::new()),
            Err(ChainError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_linkage_and_heights() {
        let mut chain = poa_chain();
        populate(&mut chain, 6, 5);

        let blocks = chain.blocks();
        assert_eq!(blocks.len(), 6);
        for i in 1..blocks.len() {
            assert_eq!(blocks[i].height, i as u64);
            assert_eq!(blocks[i].header.prev_hash, blocks[i - 1].header.hash);
        }
        assert_eq!(chain.block_times().len(), chain.len());
        assert!(chain.verify().is_ok());
    }

    #[test]
    fn test_tx_size_couples_count_and_length() {
        let mut chain = poa_chain();
        populate(&mut chain, 2, 7);

        let block = chain.last_block().unwrap();
        assert_eq!(block.tx_count, 7);
        assert!(block.transactions.iter().all(|tx| tx.len() == 7));
        assert_eq!(block.size, 49);
    }

    #[test]
    fn test_zero_tx_size_rejected() {
        let mut chain = poa_chain();
        let result = chain.create_genesis(0, &StopSignal::new());
        assert!(matches!(
            result,
            Err(ChainError::Core(CoreError::EmptyTransactions))
        ));
        assert!(chain.is_empty());
        assert!(chain.block_times().is_empty());
    }

    #[test]
    fn test_pow_chain_meets_difficulty() {
        let mut chain = pow_chain(2);
        populate(&mut chain, 3, 2);

        for block in chain.blocks() {
            assert!(block.header.hash.to_hex().starts_with("00"));
            assert_eq!(block.header.target, HeaderTarget::Difficulty(2));
        }
        assert!(chain.verify().is_ok());
    }

    #[test]
    fn test_poa_delay_is_measured() {
        let mut chain = Chain::new(
            ChainId(3),
            Consensus::Authority(PoAConfig::new(Duration::from_millis(20))),
        );
        let elapsed = chain.create_genesis(1, &StopSignal::new()).unwrap();
        assert!(elapsed >= Duration::from_millis(20));
        assert_eq!(chain.block_times(), &[elapsed]);
    }

    #[test]
    fn test_aborted_block_is_not_appended() {
        let mut chain = Chain::new(
            ChainId(4),
            Consensus::Authority(PoAConfig::new(Duration::from_secs(60))),
        );
        let stop = StopSignal::new();
        stop.raise();

        let err = chain.create_genesis(1, &stop).unwrap_err();
        assert!(err.is_aborted());
        assert!(chain.is_empty());
    }

    #[test]
    fn test_append_rejects_bad_linkage() {
        let mut chain = poa_chain();
        populate(&mut chain, 2, 1);

        let mut forged = chain.last_block().unwrap().clone();
        forged.height = 2;
        forged.header.prev_hash = Hash::ZERO;

        assert!(matches!(
            chain.append(forged, Duration::ZERO),
            Err(ChainError::Linkage { height: 2, .. })
        ));
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_append_rejects_bad_height() {
        let mut chain = poa_chain();
        populate(&mut chain, 1, 1);

        let forged = chain.last_block().unwrap().clone();
        assert!(matches!(
            chain.append(forged, Duration::ZERO),
            Err(ChainError::HeightMismatch { expected: 1, got: 0 })
        ));
    }

    #[test]
    fn test_set_consensus_affects_future_blocks() {
        let mut chain = pow_chain(0);
        populate(&mut chain, 1, 1);

        assert!(chain.set_consensus(Consensus::Work(PoWConfig { difficulty: 1 })));
        chain.add_block(1, &StopSignal::new()).unwrap();

        assert_eq!(chain.blocks()[0].header.target, HeaderTarget::Difficulty(0));
        assert_eq!(chain.blocks()[1].header.target, HeaderTarget::Difficulty(1));
        assert!(chain.verify().is_ok());
    }

    #[test]
    fn test_set_consensus_keeps_kind_once_populated() {
        let mut chain = poa_chain();
        assert!(chain.set_consensus(Consensus::Work(PoWConfig::default())));
        assert!(chain.set_consensus(Consensus::Authority(PoAConfig::default())));

        populate(&mut chain, 1, 1);
        assert!(!chain.set_consensus(Consensus::Work(PoWConfig::default())));
        assert_eq!(chain.kind(), ConsensusKind::ProofOfAuthority);
    }

    #[test]
    fn test_verify_detects_tampering() {
        let mut chain = poa_chain();
        populate(&mut chain, 3, 2);
        chain.blocks[1].transactions[0] = Transaction::from_bytes(vec![0, 0]);

        assert!(matches!(
            chain.verify(),
            Err(ChainError::Validation(ValidationError::InvalidMerkleRoot { height: 1 }))
        ));
    }

    #[test]
    fn test_snapshot_and_lookup() {
        let mut chain = poa_chain();
        populate(&mut chain, 3, 1);

        let snapshot = chain.blocks_snapshot();
        chain.add_block(1, &StopSignal::new()).unwrap();

        assert_eq!(snapshot.len(), 3);
        assert_eq!(chain.len(), 4);
        assert_eq!(chain.block_at(2), Some(&snapshot[2]));
        assert!(chain.block_at(10).is_none());
    }

    #[test]
    fn test_stats_and_series() {
        let mut chain = poa_chain();
        populate(&mut chain, 4, 3);

        let stats = chain.stats();
        assert_eq!(stats.blocks, 4);
        assert_eq!(stats.total_transactions, 12);
        assert_eq!(stats.total_bytes, 36);
        assert_eq!(stats.kind, ConsensusKind::ProofOfAuthority);
        assert_eq!(stats.total_time, chain.block_times().iter().sum::<Duration>());

        let series = chain.block_time_series();
        let heights: Vec<u64> = series.iter().map(|(h, _)| *h).collect();
        assert_eq!(heights, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_chain_id_display() {
        assert_eq!(ChainId(7).to_string(), "chain-7");
    }
}
