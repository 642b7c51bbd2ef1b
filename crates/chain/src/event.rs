//! Events streamed from a mining run to its consumer.

use crate::chain::{ChainError, ChainId};
use crate::stats;
use blocksim_core::{ConsensusKind, Hash};
use std::time::Duration;

/// A block that was built and appended.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockCompleted {
    pub chain_id: ChainId,
    pub kind: ConsensusKind,
    pub height: u64,
    /// Wall-clock time spent building the block.
    pub creation_duration: Duration,
    pub tx_count: usize,
    /// Byte length of each transaction.
    pub tx_size_bytes: usize,
    pub hash: Hash,
    pub nonce: u64,
}

impl BlockCompleted {
    /// Transactions per second for this block, `None` if no time elapsed.
    pub fn throughput(&self) -> Option<f64> {
        stats::throughput(self.tx_count, self.creation_duration)
    }
}

/// Everything a run reports.
///
/// Events from one chain arrive in height order; events from different
/// chains interleave arbitrarily.
#[derive(Debug)]
pub enum MiningEvent {
    BlockCompleted(BlockCompleted),
    /// The in-flight block was abandoned because the run was stopped.
    BlockAborted { chain_id: ChainId, height: u64 },
    /// The chain's loop ended normally or on stop.
    ChainFinished {
        chain_id: ChainId,
        blocks_added: usize,
        stopped: bool,
    },
    /// The chain's loop ended on an error. Other chains keep running.
    ChainFailed { chain_id: ChainId, error: ChainError },
}

impl MiningEvent {
    pub fn chain_id(&self) -> ChainId {
        match self {
            MiningEvent::BlockCompleted(block) => block.chain_id,
            MiningEvent::BlockAborted { chain_id, .. }
            | MiningEvent::ChainFinished { chain_id, .. }
            | MiningEvent::ChainFailed { chain_id, .. } => *chain_id,
        }
    }

    /// Whether this is the last event its chain will send.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MiningEvent::ChainFinished { .. } | MiningEvent::ChainFailed { .. }
        )
    }
}
