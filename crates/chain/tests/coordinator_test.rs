use blocksim_chain::{
    ChainConfig, ChainId, ConfigError, CoordinatorError, MiningCoordinator, MiningEvent, MiningRun,
    RunConfig,
};
use blocksim_core::{ConsensusKind, Hash};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::timeout;

const EVENT_DEADLINE: Duration = Duration::from_secs(30);

/// Drain every event of a run, failing if the stream stalls.
async fn collect_events(run: &mut MiningRun) -> Vec<MiningEvent> {
    let mut events = Vec::new();
    while let Some(event) = timeout(EVENT_DEADLINE, run.next_event())
        .await
        .expect("event stream stalled")
    {
        events.push(event);
    }
    events
}

fn completed_heights(events: &[MiningEvent], id: ChainId) -> Vec<u64> {
    events
        .iter()
        .filter_map(|event| match event {
            MiningEvent::BlockCompleted(block) if block.chain_id == id => Some(block.height),
            _ => None,
        })
        .collect()
}

fn finished(events: &[MiningEvent], id: ChainId) -> Option<(usize, bool)> {
    events.iter().find_map(|event| match event {
        MiningEvent::ChainFinished {
            chain_id,
            blocks_added,
            stopped,
        } if *chain_id == id => Some((*blocks_added, *stopped)),
        _ => None,
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_chains_complete_independently() {
    let mut coordinator = MiningCoordinator::new();
    let poa = coordinator
        .configure_chain(ChainConfig::poa(Duration::from_millis(5), 8))
        .unwrap();
    let pow = coordinator.configure_chain(ChainConfig::pow(1, 4)).unwrap();

    let mut run = coordinator.start_run(RunConfig::new(4)).unwrap();
    assert_eq!(run.chain_ids(), &[poa, pow]);
    let events = collect_events(&mut run).await;
    let summary = coordinator.finish_run(run).await.unwrap();

    assert!(!summary.stopped);
    for id in [poa, pow] {
        assert_eq!(completed_heights(&events, id), vec![0, 1, 2, 3]);
        assert_eq!(finished(&events, id), Some((4, false)));

        let chain = coordinator.chain(id).unwrap();
        assert_eq!(chain.len(), 4);
        assert!(chain.verify().is_ok());

        let blocks = chain.blocks();
        assert_eq!(blocks[0].header.prev_hash, Hash::ZERO);
        for i in 1..blocks.len() {
            assert_eq!(blocks[i].height, i as u64);
            assert_eq!(blocks[i].header.prev_hash, blocks[i - 1].header.hash);
        }
    }

    assert_eq!(coordinator.chain(poa).unwrap().kind(), ConsensusKind::ProofOfAuthority);
    assert_eq!(coordinator.chain(pow).unwrap().kind(), ConsensusKind::ProofOfWork);
    assert_eq!(summary.stats.len(), 2);
    assert!(summary.stats.iter().all(|stats| stats.blocks == 4));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_completed_events_describe_blocks() {
    let mut coordinator = MiningCoordinator::new();
    let id = coordinator.configure_chain(ChainConfig::pow(2, 6)).unwrap();

    let mut run = coordinator.start_run(RunConfig::new(3)).unwrap();
    let events = collect_events(&mut run).await;
    coordinator.finish_run(run).await.unwrap();

    let chain = coordinator.chain(id).unwrap();
    let mut seen = 0;
    for event in &events {
        if let MiningEvent::BlockCompleted(block) = event {
            let stored = chain.block_at(block.height).unwrap();
            assert_eq!(block.hash, stored.hash());
            assert_eq!(block.nonce, stored.header.nonce);
            assert_eq!(block.tx_count, 6);
            assert_eq!(block.tx_size_bytes, 6);
            assert_eq!(block.kind, ConsensusKind::ProofOfWork);
            assert_eq!(block.creation_duration, chain.block_times()[block.height as usize]);
            assert!(block.hash.to_hex().starts_with("00"));
            seen += 1;
        }
    }
    assert_eq!(seen, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_halts_every_chain() {
    let mut coordinator = MiningCoordinator::new();
    let slow_poa = coordinator
        .configure_chain(ChainConfig::poa(Duration::from_millis(40), 2))
        .unwrap();
    // Far beyond what the test could ever mine, so only stop ends it.
    let hard_pow = coordinator.configure_chain(ChainConfig::pow(12, 2)).unwrap();

    let mut run = coordinator.start_run(RunConfig::new(10_000)).unwrap();

    // Let the PoA chain land at least one block before stopping.
    let first = timeout(EVENT_DEADLINE, run.next_event())
        .await
        .expect("no first event")
        .expect("stream closed early");
    assert_eq!(first.chain_id(), slow_poa);

    coordinator.stop_run().unwrap();
    let mut events = vec![first];
    events.extend(collect_events(&mut run).await);
    let summary = coordinator.finish_run(run).await.unwrap();
    assert!(summary.stopped);

    let mut terminal: HashMap<ChainId, bool> = HashMap::new();
    for event in &events {
        if let MiningEvent::ChainFinished { chain_id, stopped, .. } = event {
            terminal.insert(*chain_id, *stopped);
        }
    }
    assert_eq!(terminal.get(&slow_poa), Some(&true));
    assert_eq!(terminal.get(&hard_pow), Some(&true));

    // No block appears in a chain without a matching completed event.
    for id in [slow_poa, hard_pow] {
        let chain = coordinator.chain(id).unwrap();
        assert_eq!(chain.len(), completed_heights(&events, id).len());
        assert!(chain.verify().is_ok());
    }

    let pow_chain = coordinator.chain(hard_pow).unwrap();
    assert!(pow_chain.is_empty());
    assert!(events.iter().any(|event| matches!(
        event,
        MiningEvent::BlockAborted { chain_id, height: 0 } if *chain_id == hard_pow
    )));
}

#[tokio::test]
async fn test_invalid_config_never_starts() {
    let mut coordinator = MiningCoordinator::new();
    coordinator.configure_chain(ChainConfig::default()).unwrap();

    let err = coordinator
        .configure_chain(ChainConfig::pow(1, 0))
        .unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::Config(ConfigError::NonPositiveTxSize(0))
    ));

    assert!(matches!(
        ChainConfig::poa_secs(-1.0, 10),
        Err(ConfigError::NegativeDelay(_))
    ));
    assert_eq!(coordinator.chain_count(), 1);
    assert!(!coordinator.is_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_in_progress_blocks_changes() {
    let mut coordinator = MiningCoordinator::new();
    let id = coordinator
        .configure_chain(ChainConfig::poa(Duration::from_millis(20), 1))
        .unwrap();

    let mut run = coordinator.start_run(RunConfig::new(3)).unwrap();
    assert!(coordinator.is_running());
    assert!(coordinator.chain(id).is_none());
    assert!(matches!(
        coordinator.start_run(RunConfig::new(1)),
        Err(CoordinatorError::RunInProgress)
    ));
    assert!(matches!(
        coordinator.configure_chain(ChainConfig::default()),
        Err(CoordinatorError::RunInProgress)
    ));

    collect_events(&mut run).await;
    coordinator.finish_run(run).await.unwrap();
    assert!(!coordinator.is_running());
    assert_eq!(coordinator.chain(id).unwrap().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_later_run_extends_chains() {
    let mut coordinator = MiningCoordinator::new();
    let id = coordinator.configure_chain(ChainConfig::pow(0, 3)).unwrap();

    let mut run = coordinator.start_run(RunConfig::new(2)).unwrap();
    collect_events(&mut run).await;
    coordinator.finish_run(run).await.unwrap();

    coordinator
        .reconfigure_chain(id, ChainConfig::pow(1, 3))
        .unwrap();

    let mut run = coordinator.start_run(RunConfig::new(3)).unwrap();
    let events = collect_events(&mut run).await;
    coordinator.finish_run(run).await.unwrap();

    assert_eq!(completed_heights(&events, id), vec![2, 3, 4]);
    let chain = coordinator.chain(id).unwrap();
    assert_eq!(chain.len(), 5);
    assert!(chain.verify().is_ok());
    assert!(chain.blocks()[4].header.hash.to_hex().starts_with('0'));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_per_chain_block_override_and_pace() {
    let mut coordinator = MiningCoordinator::new();
    let short = coordinator
        .configure_chain(ChainConfig::default().with_blocks(1))
        .unwrap();
    let long = coordinator.configure_chain(ChainConfig::pow(0, 2)).unwrap();

    let run_config = RunConfig::new(4).with_pace(Duration::from_millis(5));
    let mut run = coordinator.start_run(run_config).unwrap();
    let events = collect_events(&mut run).await;
    coordinator.finish_run(run).await.unwrap();

    assert_eq!(finished(&events, short), Some((1, false)));
    assert_eq!(finished(&events, long), Some((4, false)));
    assert_eq!(coordinator.chain(short).unwrap().len(), 1);
    assert_eq!(coordinator.chain(long).unwrap().len(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropped_run_stops_and_returns_chains() {
    let mut coordinator = MiningCoordinator::new();
    let poa = coordinator
        .configure_chain(ChainConfig::poa(Duration::from_millis(50), 2))
        .unwrap();
    // Only a stop can end this search.
    let pow = coordinator.configure_chain(ChainConfig::pow(12, 2)).unwrap();

    let run = coordinator.start_run(RunConfig::new(10_000)).unwrap();
    drop(run);

    timeout(EVENT_DEADLINE, async {
        while !coordinator.reclaim_abandoned_run() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("abandoned run was never reclaimed");

    assert!(!coordinator.is_running());
    assert_eq!(coordinator.chain_count(), 2);
    assert!(coordinator.chain(pow).unwrap().is_empty());
    assert!(coordinator.chain(poa).unwrap().verify().is_ok());

    let extra = coordinator.configure_chain(ChainConfig::pow(0, 1)).unwrap();
    coordinator
        .reconfigure_chain(pow, ChainConfig::pow(1, 2))
        .unwrap();

    let mut run = coordinator.start_run(RunConfig::new(1)).unwrap();
    assert_eq!(run.chain_ids(), &[poa, pow, extra]);
    collect_events(&mut run).await;
    let summary = coordinator.finish_run(run).await.unwrap();

    assert!(!summary.stopped);
    assert_eq!(coordinator.chain(pow).unwrap().len(), 1);
    assert_eq!(coordinator.chain(extra).unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_live_run_is_not_reclaimed() {
    let mut coordinator = MiningCoordinator::new();
    coordinator
        .configure_chain(ChainConfig::poa(Duration::from_millis(20), 1))
        .unwrap();

    let mut run = coordinator.start_run(RunConfig::new(2)).unwrap();
    assert!(!coordinator.reclaim_abandoned_run());

    collect_events(&mut run).await;
    // Workers are done, but the handle is still held.
    assert!(!coordinator.reclaim_abandoned_run());
    assert!(coordinator.is_running());

    coordinator.finish_run(run).await.unwrap();
    assert!(coordinator.reclaim_abandoned_run());
}
