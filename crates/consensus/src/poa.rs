//! Proof of Authority (PoA) header sealing.
//!
//! An authority validates instantly: the header hash is computed once with
//! the double-round hasher and the nonce stays 0. The only cost modeled is
//! an optional validation delay that elapses before the header is built,
//! standing in for authority-node latency.

use crate::stop::StopSignal;
use crate::{ConsensusError, Result};
use blocksim_core::{digest, BlockHeader, Hash, HashMode, HeaderTarget, BLOCK_VERSION};
use std::time::Duration;
use tracing::trace;

/// Compact bits string stamped on authority headers.
pub const DEFAULT_BITS: &str = "ffff001f";

/// Proof of Authority configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoAConfig {
    /// Wait applied before each header is built.
    pub validation_delay: Duration,
    /// Bits field written into each header.
    pub bits: String,
    /// Header version.
    pub version: u32,
}

impl Default for PoAConfig {
    fn default() -> Self {
        Self {
            validation_delay: Duration::ZERO,
            bits: DEFAULT_BITS.to_string(),
            version: BLOCK_VERSION,
        }
    }
}

impl PoAConfig {
    /// Create a configuration with the given validation delay.
    pub fn new(validation_delay: Duration) -> Self {
        Self {
            validation_delay,
            ..Self::default()
        }
    }

    /// Sleep through the validation delay.
    ///
    /// Fails with [`ConsensusError::Aborted`] if `stop` is raised while
    /// waiting. A zero delay never waits and never aborts.
    pub fn await_validation(&self, stop: &StopSignal) -> Result<()> {
        if self.validation_delay.is_zero() {
            return Ok(());
        }

        trace!(delay = ?self.validation_delay, "waiting for authority validation");
        if stop.wait_timeout(self.validation_delay) {
            return Err(ConsensusError::Aborted);
        }
        Ok(())
    }

    /// Seal a header with this configuration's version and bits.
    pub fn seal(&self, prev_hash: Hash, merkle_root: Hash, timestamp: u64) -> BlockHeader {
        seal_header(self.version, prev_hash, merkle_root, timestamp, &self.bits)
    }
}

/// Build an authority header. Always succeeds.
pub fn seal_header(
    version: u32,
    prev_hash: Hash,
    merkle_root: Hash,
    timestamp: u64,
    bits: &str,
) -> BlockHeader {
    let preimage = BlockHeader::poa_preimage(version, &prev_hash, &merkle_root, timestamp, bits);
    let hash = digest(HashMode::Double, preimage.as_bytes());

    BlockHeader {
        version,
        prev_hash,
        merkle_root,
        timestamp,
        nonce: 0,
        target: HeaderTarget::Bits(bits.to_string()),
        hash,
    }
}
