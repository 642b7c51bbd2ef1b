//! Per-chain and per-run configuration.
//!
//! Configuration is validated up front: a run never starts if any chain's
//! configuration is rejected.

use blocksim_consensus::{Consensus, PoAConfig, PoWConfig, MAX_DIFFICULTY};
use blocksim_core::ConsensusKind;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default transaction size, used for both count and byte length.
pub const DEFAULT_TX_SIZE: usize = 100;

/// Default number of blocks each chain mines per run.
pub const DEFAULT_BLOCKS_PER_CHAIN: usize = 10;

/// Errors raised while validating configuration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("transaction size must be positive, got {0}")]
    NonPositiveTxSize(i64),

    #[error("validation delay must not be negative, got {0}s")]
    NegativeDelay(f64),

    #[error("validation delay is not a finite number of seconds: {0}")]
    InvalidDelay(f64),

    #[error("difficulty must not be negative, got {0}")]
    NegativeDifficulty(i64),

    #[error("difficulty {difficulty} exceeds maximum of {max}")]
    DifficultyTooHigh { difficulty: i64, max: u32 },

    #[error("no chains configured")]
    NoChains,

    #[error("invalid chain spec {spec:?}: {reason}")]
    InvalidSpec { spec: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Consensus-specific parameters of a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusParams {
    ProofOfAuthority { validation_delay: Duration },
    ProofOfWork { difficulty: u32 },
}

impl ConsensusParams {
    pub fn kind(&self) -> ConsensusKind {
        match self {
            ConsensusParams::ProofOfAuthority { .. } => ConsensusKind::ProofOfAuthority,
            ConsensusParams::ProofOfWork { .. } => ConsensusKind::ProofOfWork,
        }
    }

    /// Build the consensus engine these parameters describe.
    pub fn to_consensus(&self) -> Consensus {
        match *self {
            ConsensusParams::ProofOfAuthority { validation_delay } => {
                Consensus::Authority(PoAConfig::new(validation_delay))
            }
            ConsensusParams::ProofOfWork { difficulty } => {
                Consensus::Work(PoWConfig { difficulty })
            }
        }
    }
}

/// Configuration of one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    /// Consensus discipline and its delay or difficulty.
    pub consensus: ConsensusParams,
    /// Transactions per block, and bytes per transaction.
    pub tx_size: usize,
    /// Blocks to mine per run; `None` uses the run's default.
    pub blocks: Option<usize>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self::poa(Duration::ZERO, DEFAULT_TX_SIZE)
    }
}

impl ChainConfig {
    pub fn poa(validation_delay: Duration, tx_size: usize) -> Self {
        Self {
            consensus: ConsensusParams::ProofOfAuthority { validation_delay },
            tx_size,
            blocks: None,
        }
    }

    pub fn pow(difficulty: u32, tx_size: usize) -> Self {
        Self {
            consensus: ConsensusParams::ProofOfWork { difficulty },
            tx_size,
            blocks: None,
        }
    }

    /// Build a PoA configuration from unchecked user input.
    pub fn poa_secs(delay_secs: f64, tx_size: i64) -> Result<Self> {
        let delay = parse_delay(delay_secs)?;
        let tx_size = parse_tx_size(tx_size)?;
        Ok(Self::poa(delay, tx_size))
    }

    /// Build a PoW configuration from unchecked user input.
    pub fn pow_signed(difficulty: i64, tx_size: i64) -> Result<Self> {
        let difficulty = parse_difficulty(difficulty)?;
        let tx_size = parse_tx_size(tx_size)?;
        Ok(Self::pow(difficulty, tx_size))
    }

    /// Override the run's block count for this chain.
    pub fn with_blocks(mut self, blocks: usize) -> Self {
        self.blocks = Some(blocks);
        self
    }

    pub fn kind(&self) -> ConsensusKind {
        self.consensus.kind()
    }

    /// Check every field. Nothing is started from a config that fails.
    pub fn validate(&self) -> Result<()> {
        if self.tx_size == 0 {
            return Err(ConfigError::NonPositiveTxSize(0));
        }
        if let ConsensusParams::ProofOfWork { difficulty } = self.consensus {
            if difficulty > MAX_DIFFICULTY {
                return Err(ConfigError::DifficultyTooHigh {
                    difficulty: i64::from(difficulty),
                    max: MAX_DIFFICULTY,
                });
            }
        }
        Ok(())
    }
}

fn parse_delay(delay_secs: f64) -> Result<Duration> {
    if delay_secs.is_nan() || delay_secs.is_infinite() {
        return Err(ConfigError::InvalidDelay(delay_secs));
    }
    if delay_secs < 0.0 {
        return Err(ConfigError::NegativeDelay(delay_secs));
    }
    Duration::try_from_secs_f64(delay_secs).map_err(|_| ConfigError::InvalidDelay(delay_secs))
}

fn parse_difficulty(difficulty: i64) -> Result<u32> {
    if difficulty < 0 {
        return Err(ConfigError::NegativeDifficulty(difficulty));
    }
    u32::try_from(difficulty)
        .ok()
        .filter(|d| *d <= MAX_DIFFICULTY)
        .ok_or(ConfigError::DifficultyTooHigh {
            difficulty,
            max: MAX_DIFFICULTY,
        })
}

fn parse_tx_size(tx_size: i64) -> Result<usize> {
    if tx_size <= 0 {
        return Err(ConfigError::NonPositiveTxSize(tx_size));
    }
    usize::try_from(tx_size).map_err(|_| ConfigError::NonPositiveTxSize(tx_size))
}

/// Parses `poa:<delay-secs>:<tx-size>[:<blocks>]` or
/// `pow:<difficulty>:<tx-size>[:<blocks>]`.
impl FromStr for ChainConfig {
    type Err = ConfigError;

    fn from_str(spec: &str) -> Result<Self> {
        let invalid = |reason: &str| ConfigError::InvalidSpec {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = spec.trim().split(':').collect();
        if !(3..=4).contains(&parts.len()) {
            return Err(invalid("expected <kind>:<param>:<tx-size>[:<blocks>]"));
        }

        let tx_size: i64 = parts[2]
            .parse()
            .map_err(|_| invalid("tx size is not an integer"))?;

        let config = match parts[0].to_ascii_lowercase().as_str() {
            "poa" => {
                let delay: f64 = parts[1]
                    .parse()
                    .map_err(|_| invalid("delay is not a number"))?;
                Self::poa_secs(delay, tx_size)?
            }
            "pow" => {
                let difficulty: i64 = parts[1]
                    .parse()
                    .map_err(|_| invalid("difficulty is not an integer"))?;
                Self::pow_signed(difficulty, tx_size)?
            }
            _ => return Err(invalid("kind must be poa or pow")),
        };

        match parts.get(3) {
            Some(blocks) => {
                let blocks: usize = blocks
                    .parse()
                    .map_err(|_| invalid("block count is not a non-negative integer"))?;
                Ok(config.with_blocks(blocks))
            }
            None => Ok(config),
        }
    }
}

/// Settings shared by every chain in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Blocks each chain appends unless its own config overrides it.
    pub blocks_per_chain: usize,
    /// Pause between consecutive blocks of one chain.
    pub pace: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            blocks_per_chain: DEFAULT_BLOCKS_PER_CHAIN,
            pace: Duration::ZERO,
        }
    }
}

impl RunConfig {
    pub fn new(blocks_per_chain: usize) -> Self {
        Self {
            blocks_per_chain,
            ..Self::default()
        }
    }

    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }
}
