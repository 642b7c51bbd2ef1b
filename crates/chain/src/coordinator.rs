//! Concurrent mining across independently configured chains.
//!
//! Each chain is moved onto its own blocking task for the duration of a
//! run, so no two tasks ever touch the same chain. Tasks talk to the
//! outside only through the event channel and observe one shared
//! [`StopSignal`]: between blocks, during a PoA delay, and every few
//! nonces of a PoW search. When the run is finished the chains move back
//! into the coordinator and can be inspected or extended by a later run.
//! A run whose handle is dropped is stopped, and its chains are reclaimed
//! once every worker has handed its chain back.

use crate::chain::{Chain, ChainId};
use crate::config::{ChainConfig, ConfigError, RunConfig};
use crate::event::{BlockCompleted, MiningEvent};
use crate::stats::ChainStats;
use blocksim_consensus::StopSignal;
use blocksim_core::ConsensusKind;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{info, trace, warn};

/// Errors that can occur while coordinating runs.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("a run is already in progress")]
    RunInProgress,

    #[error("no run is in progress")]
    NoActiveRun,

    #[error("unknown chain: {0}")]
    UnknownChain(ChainId),

    #[error("{chain} already holds {kind} blocks and cannot switch consensus")]
    KindLocked { chain: ChainId, kind: ConsensusKind },

    #[error("no tokio runtime available to spawn mining tasks")]
    NoRuntime,

    #[error("mining task for {chain} failed: {reason}")]
    TaskFailed { chain: ChainId, reason: String },
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;

struct ChainEntry {
    config: ChainConfig,
    chain: Chain,
}

/// Chains handed back by workers as they end.
type Returned = Arc<Mutex<Vec<ChainEntry>>>;

/// Bookkeeping for the run currently out on workers.
struct ActiveRun {
    stop: StopSignal,
    returned: Returned,
    workers: usize,
    tasks: Vec<(ChainId, JoinHandle<()>)>,
    handle: Weak<()>,
}

impl ActiveRun {
    fn all_returned(&self) -> bool {
        self.returned.lock().len() == self.workers
    }

    fn abandoned(&self) -> bool {
        self.handle.strong_count() == 0
    }
}

/// Owns a set of chains and drives them concurrently.
#[derive(Default)]
pub struct MiningCoordinator {
    entries: Vec<ChainEntry>,
    next_id: u32,
    active: Option<ActiveRun>,
}

impl MiningCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a configuration and create an empty chain for it.
    pub fn configure_chain(&mut self, config: ChainConfig) -> Result<ChainId> {
        self.ensure_idle()?;
        config.validate()?;

        self.next_id += 1;
        let id = ChainId(self.next_id);
        let chain = Chain::new(id, config.consensus.to_consensus());
        info!(chain = %id, kind = %config.kind(), tx_size = config.tx_size, "chain configured");

        self.entries.push(ChainEntry { config, chain });
        Ok(id)
    }

    /// Replace an existing chain's configuration for future blocks.
    ///
    /// A populated chain keeps its consensus kind.
    pub fn reconfigure_chain(&mut self, id: ChainId, config: ChainConfig) -> Result<()> {
        self.ensure_idle()?;
        config.validate()?;

        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.chain.id() == id)
            .ok_or(CoordinatorError::UnknownChain(id))?;

        if !entry.chain.set_consensus(config.consensus.to_consensus()) {
            return Err(CoordinatorError::KindLocked {
                chain: id,
                kind: entry.chain.kind(),
            });
        }
        entry.config = config;
        Ok(())
    }

    /// Look up a chain while no run is in progress.
    pub fn chain(&self, id: ChainId) -> Option<&Chain> {
        self.entries
            .iter()
            .map(|entry| &entry.chain)
            .find(|chain| chain.id() == id)
    }

    /// All chains held by the coordinator, in configuration order.
    pub fn chains(&self) -> impl Iterator<Item = &Chain> {
        self.entries.iter().map(|entry| &entry.chain)
    }

    pub fn chain_count(&self) -> usize {
        self.entries.len()
    }

    /// Whether a run still holds the chains.
    ///
    /// A run whose [`MiningRun`] was dropped counts until it is reclaimed.
    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Start mining every configured chain concurrently.
    ///
    /// Returns immediately; progress arrives through [`MiningRun`]. Must be
    /// called from within a tokio runtime.
    pub fn start_run(&mut self, run: RunConfig) -> Result<MiningRun> {
        self.ensure_idle()?;
        if self.entries.is_empty() {
            return Err(ConfigError::NoChains.into());
        }
        for entry in &self.entries {
            entry.config.validate()?;
        }
        let handle =
            tokio::runtime::Handle::try_current().map_err(|_| CoordinatorError::NoRuntime)?;

        let stop = StopSignal::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let returned: Returned = Arc::new(Mutex::new(Vec::with_capacity(self.entries.len())));
        let alive = Arc::new(());

        info!(
            chains = self.entries.len(),
            blocks_per_chain = run.blocks_per_chain,
            "mining run started"
        );

        let workers = self.entries.len();
        let mut tasks = Vec::with_capacity(workers);
        for entry in self.entries.drain(..) {
            let id = entry.chain.id();
            let worker = ChainWorker {
                target: entry.config.blocks.unwrap_or(run.blocks_per_chain),
                pace: run.pace,
                stop: stop.clone(),
                events: events_tx.clone(),
            };
            let mut slot = ReturnSlot {
                entry: Some(entry),
                returned: Arc::clone(&returned),
            };
            let task = handle.spawn_blocking(move || {
                if let Some(entry) = slot.entry.as_mut() {
                    worker.run(entry);
                }
            });
            tasks.push((id, task));
        }

        let chain_ids = tasks.iter().map(|(id, _)| *id).collect();
        self.active = Some(ActiveRun {
            stop: stop.clone(),
            returned,
            workers,
            tasks,
            handle: Arc::downgrade(&alive),
        });

        Ok(MiningRun {
            stop,
            events: events_rx,
            chain_ids,
            _alive: alive,
        })
    }

    /// Raise the stop flag of the active run.
    pub fn stop_run(&self) -> Result<()> {
        let active = self.active.as_ref().ok_or(CoordinatorError::NoActiveRun)?;
        info!("stop requested");
        active.stop.raise();
        Ok(())
    }

    /// Wait for every chain task and take the chains back.
    ///
    /// Events not yet consumed are dropped with the run. Chains come back
    /// even if their task panicked; the first such failure is returned.
    pub async fn finish_run(&mut self, run: MiningRun) -> Result<RunSummary> {
        let active = self.active.as_mut().ok_or(CoordinatorError::NoActiveRun)?;

        let mut failure = None;
        while let Some((id, task)) = active.tasks.pop() {
            if let Err(err) = task.await {
                warn!(chain = %id, error = %err, "mining task did not complete");
                failure.get_or_insert(CoordinatorError::TaskFailed {
                    chain: id,
                    reason: err.to_string(),
                });
            }
        }
        let stopped = active.stop.is_raised();
        drop(run);
        self.restore_entries();

        if let Some(err) = failure {
            return Err(err);
        }

        let summary = RunSummary {
            stopped,
            stats: self.entries.iter().map(|entry| entry.chain.stats()).collect(),
        };
        info!(stopped = summary.stopped, "mining run finished");
        Ok(summary)
    }

    /// Take the chains back from a run whose [`MiningRun`] was dropped.
    ///
    /// Returns `true` once the coordinator is idle. A dropped run is
    /// stopped immediately, but its workers may need a moment to notice;
    /// until every chain is back this returns `false`.
    pub fn reclaim_abandoned_run(&mut self) -> bool {
        let reclaimable = match &self.active {
            None => return true,
            Some(active) => active.abandoned() && active.all_returned(),
        };
        if !reclaimable {
            return false;
        }

        warn!("reclaiming chains from an abandoned run");
        self.restore_entries();
        true
    }

    fn restore_entries(&mut self) {
        if let Some(active) = self.active.take() {
            self.entries.append(&mut active.returned.lock());
            self.entries.sort_by_key(|entry| entry.chain.id());
        }
    }

    fn ensure_idle(&mut self) -> Result<()> {
        if !self.reclaim_abandoned_run() {
            return Err(CoordinatorError::RunInProgress);
        }
        Ok(())
    }
}

/// Handle to an in-progress run.
///
/// Dropping it without [`MiningCoordinator::finish_run`] stops the run;
/// the coordinator takes the chains back once the workers have ended.
pub struct MiningRun {
    stop: StopSignal,
    events: UnboundedReceiver<MiningEvent>,
    chain_ids: Vec<ChainId>,
    _alive: Arc<()>,
}

impl MiningRun {
    /// Raise the run's stop flag.
    pub fn stop(&self) {
        self.stop.raise();
    }

    /// Wait for the next event. `None` once every chain task has ended.
    pub async fn next_event(&mut self) -> Option<MiningEvent> {
        self.events.recv().await
    }

    /// Chains taking part in this run.
    pub fn chain_ids(&self) -> &[ChainId] {
        &self.chain_ids
    }
}

impl Drop for MiningRun {
    fn drop(&mut self) {
        self.stop.raise();
    }
}

/// Per-chain statistics after a run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Whether the run was stopped before completing.
    pub stopped: bool,
    pub stats: Vec<ChainStats>,
}

/// Hands a worker's chain back to the coordinator when the worker ends,
/// including by panic.
struct ReturnSlot {
    entry: Option<ChainEntry>,
    returned: Returned,
}

impl Drop for ReturnSlot {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            self.returned.lock().push(entry);
        }
    }
}

/// One chain's block loop, executed on its own blocking task.
struct ChainWorker {
    target: usize,
    pace: Duration,
    stop: StopSignal,
    events: UnboundedSender<MiningEvent>,
}

impl ChainWorker {
    fn run(&self, entry: &mut ChainEntry) {
        let id = entry.chain.id();
        let tx_size = entry.config.tx_size;
        let mut added = 0;
        let mut stopped = false;

        while added < self.target {
            if self.stop.is_raised() {
                stopped = true;
                break;
            }
            if added > 0 && !self.pace.is_zero() && self.stop.wait_timeout(self.pace) {
                stopped = true;
                break;
            }

            let chain = &mut entry.chain;
            let height = chain.next_height();
            let result = if chain.is_empty() {
                chain.create_genesis(tx_size, &self.stop)
            } else {
                chain.add_block(tx_size, &self.stop)
            };

            match result {
                Ok(duration) => {
                    added += 1;
                    if let Some(completed) = completed(entry, duration) {
                        self.emit(id, MiningEvent::BlockCompleted(completed));
                    }
                }
                Err(err) if err.is_aborted() => {
                    warn!(chain = %id, height, "block aborted by stop signal");
                    self.emit(
                        id,
                        MiningEvent::BlockAborted {
                            chain_id: id,
                            height,
                        },
                    );
                    stopped = true;
                    break;
                }
                Err(error) => {
                    warn!(chain = %id, height, %error, "chain failed");
                    self.emit(
                        id,
                        MiningEvent::ChainFailed {
                            chain_id: id,
                            error,
                        },
                    );
                    return;
                }
            }
        }

        info!(chain = %id, blocks_added = added, stopped, "chain run ended");
        self.emit(
            id,
            MiningEvent::ChainFinished {
                chain_id: id,
                blocks_added: added,
                stopped,
            },
        );
    }

    fn emit(&self, id: ChainId, event: MiningEvent) {
        if self.events.send(event).is_err() {
            trace!(chain = %id, "event receiver dropped");
        }
    }
}

/// Describe the block just appended at the tip.
fn completed(entry: &ChainEntry, duration: Duration) -> Option<BlockCompleted> {
    let chain = &entry.chain;
    let block = chain.last_block()?;
    Some(BlockCompleted {
        chain_id: chain.id(),
        kind: chain.kind(),
        height: block.height,
        creation_duration: duration,
        tx_count: block.tx_count,
        tx_size_bytes: entry.config.tx_size,
        hash: block.hash(),
        nonce: block.header.nonce,
    })
}
