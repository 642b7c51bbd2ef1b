//! Chain bookkeeping and concurrent mining for blocksim.
//!
//! This crate brings the primitives and consensus engines together:
//! - **Chain**: append-only blocks with per-block creation timings
//! - **Stats**: average block time and throughput
//! - **Config**: validated per-chain and per-run settings
//! - **Coordinator**: runs several chains in parallel and streams events
//!
//! # Example
//!
//! ```rust,no_run
//! use blocksim_chain::{ChainConfig, MiningCoordinator, MiningEvent, RunConfig};
//! use std::time::Duration;
//!
//! # async fn demo() -> Result<(), blocksim_chain::CoordinatorError> {
//! let mut coordinator = MiningCoordinator::new();
//! coordinator.configure_chain(ChainConfig::poa(Duration::from_millis(100), 100))?;
//! coordinator.configure_chain(ChainConfig::pow(3, 100))?;
//!
//! let mut run = coordinator.start_run(RunConfig::new(5))?;
//! while let Some(event) = run.next_event().await {
//!     if let MiningEvent::BlockCompleted(block) = event {
//!         println!("{} #{} in {:?}", block.chain_id, block.height, block.creation_duration);
//!     }
//! }
//!
//! let summary = coordinator.finish_run(run).await?;
//! # let _ = summary;
//! # Ok(())
//! # }
//! ```

pub mod chain;
pub mod config;
pub mod coordinator;
pub mod event;
pub mod stats;

// Re-export commonly used types
pub use chain::{Chain, ChainError, ChainId};
pub use config::{ChainConfig, ConfigError, ConsensusParams, RunConfig};
pub use coordinator::{CoordinatorError, MiningCoordinator, MiningRun, RunSummary};
pub use event::{BlockCompleted, MiningEvent};
pub use stats::{throughput, ChainStats};
