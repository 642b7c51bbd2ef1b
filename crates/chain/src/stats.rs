//! Block timing statistics.

use crate::chain::ChainId;
use blocksim_core::ConsensusKind;
use std::time::Duration;

/// Transactions per second over `duration`.
///
/// Returns `None` when no time elapsed, which callers must report as
/// unavailable rather than as zero throughput.
pub fn throughput(tx_count: usize, duration: Duration) -> Option<f64> {
    if duration.is_zero() {
        return None;
    }
    Some(tx_count as f64 / duration.as_secs_f64())
}

/// Arithmetic mean of the samples, zero if there are none.
pub fn average(times: &[Duration]) -> Duration {
    if times.is_empty() {
        return Duration::ZERO;
    }
    let total: Duration = times.iter().sum();
    match u32::try_from(times.len()) {
        Ok(count) => total / count,
        Err(_) => total.div_f64(times.len() as f64),
    }
}

/// Format an optional throughput the way tables show it.
pub fn format_throughput(tps: Option<f64>) -> String {
    match tps {
        Some(value) => format!("{:.2}", value),
        None => "N/A".to_string(),
    }
}

/// Summary of one chain's blocks and timings.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainStats {
    /// Which chain.
    pub chain_id: ChainId,
    /// Consensus discipline.
    pub kind: ConsensusKind,
    /// Number of blocks, genesis included.
    pub blocks: usize,
    /// Transactions across all blocks.
    pub total_transactions: usize,
    /// Payload bytes across all blocks.
    pub total_bytes: usize,
    /// Sum of all block creation times.
    pub total_time: Duration,
    /// Mean block creation time.
    pub average_block_time: Duration,
    /// Total transactions over total time.
    pub throughput: Option<f64>,
}
