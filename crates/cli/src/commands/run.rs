//! Mining run command.

use super::runfile::{parse_pace, RunFile};
use anyhow::{bail, Context, Result};
use blocksim_chain::config::DEFAULT_BLOCKS_PER_CHAIN;
use blocksim_chain::stats::format_throughput;
use blocksim_chain::{
    BlockCompleted, Chain, ChainConfig, MiningCoordinator, MiningEvent, RunConfig, RunSummary,
};
use blocksim_core::{Block, HeaderTarget};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

#[derive(Args)]
pub struct RunArgs {
    /// Chain to mine, as poa:<delay-secs>:<tx-size>[:<blocks>] or
    /// pow:<difficulty>:<tx-size>[:<blocks>] (repeatable)
    #[arg(short, long = "chain", value_name = "SPEC")]
    chains: Vec<ChainConfig>,

    /// TOML run file with [[chain]] tables
    #[arg(short, long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// Blocks each chain mines, genesis included on a fresh chain
    #[arg(short, long)]
    blocks: Option<usize>,

    /// Seconds to pause between blocks of one chain
    #[arg(short, long)]
    pace: Option<f64>,

    /// Stop the run after this many seconds
    #[arg(long, value_name = "SECS")]
    stop_after: Option<f64>,

    /// Print the summary as JSON instead of tables
    #[arg(long)]
    json: bool,

    /// Print every block of every chain after the run
    #[arg(long)]
    show_blocks: bool,
}

pub async fn run(args: RunArgs) -> Result<()> {
    let (configs, run_config) = resolve(&args)?;
    let stop_after = args.stop_after.map(parse_pace).transpose()?;
    debug!(chains = configs.len(), ?run_config, ?stop_after, "resolved run settings");

    let mut coordinator = MiningCoordinator::new();
    for config in configs {
        let kind = config.kind();
        let id = coordinator
            .configure_chain(config)
            .context("Failed to configure chain")?;
        if !args.json {
            println!(
                "{}  Configured {} ({})",
                "✓".green().bold(),
                id.to_string().bright_cyan(),
                kind
            );
        }
    }

    let mut run = coordinator
        .start_run(run_config)
        .context("Failed to start mining run")?;
    debug!(chains = ?run.chain_ids(), "mining run started");

    if !args.json {
        println!();
        print_table_header();
    }

    let stop_timer = async {
        match stop_after {
            Some(after) => tokio::time::sleep(after).await,
            None => std::future::pending().await,
        }
    };
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(stop_timer, ctrl_c);

    let mut stopping = false;
    loop {
        tokio::select! {
            event = run.next_event() => match event {
                Some(event) if !args.json => print_event(&event),
                Some(_) => {}
                None => break,
            },
            signal = &mut ctrl_c, if !stopping => {
                signal.context("Failed to listen for Ctrl-C")?;
                stopping = true;
                run.stop();
                eprintln!("{}", "Stopping run...".yellow());
            }
            _ = &mut stop_timer, if !stopping => {
                stopping = true;
                run.stop();
            }
        }
    }

    let summary = coordinator
        .finish_run(run)
        .await
        .context("Mining run did not finish cleanly")?;

    if args.json {
        let report = json_report(&summary, &coordinator);
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_summary(&summary);
    if args.show_blocks {
        for chain in coordinator.chains() {
            print_chain_blocks(chain);
        }
    }

    Ok(())
}

/// Merge flags and the optional run file. Flags override file settings.
fn resolve(args: &RunArgs) -> Result<(Vec<ChainConfig>, RunConfig)> {
    let mut run_config = RunConfig::new(DEFAULT_BLOCKS_PER_CHAIN);
    let mut configs = Vec::new();

    if let Some(path) = &args.file {
        let file = RunFile::load(path)?;
        configs = file.chain_configs()?;
        run_config = file.run_config(run_config)?;
    }
    configs.extend(args.chains.iter().cloned());

    if configs.is_empty() {
        bail!("No chains configured. Pass --chain <SPEC> or --file <PATH>.");
    }
    if let Some(blocks) = args.blocks {
        run_config.blocks_per_chain = blocks;
    }
    if let Some(pace) = args.pace {
        run_config.pace = parse_pace(pace)?;
    }

    Ok((configs, run_config))
}

fn print_table_header() {
    println!(
        "  {:<9} {:<4} {:>6} {:>12} {:>12} {:>8}  {}",
        "CHAIN".bold(),
        "KIND".bold(),
        "HEIGHT".bold(),
        "TIME".bold(),
        "TPS".bold(),
        "BYTES".bold(),
        "HASH".bold()
    );
}

fn print_event(event: &MiningEvent) {
    match event {
        MiningEvent::BlockCompleted(block) => print_block_row(block),
        MiningEvent::BlockAborted { chain_id, height } => {
            println!(
                "  {:<9} {}",
                chain_id.to_string().bright_cyan(),
                format!("block #{} aborted", height).yellow()
            );
        }
        MiningEvent::ChainFinished {
            chain_id,
            blocks_added,
            stopped,
        } => {
            let status = if *stopped { "stopped" } else { "finished" };
            println!(
                "{}  {} {} after {} blocks",
                "✓".green().bold(),
                chain_id.to_string().bright_cyan(),
                status,
                blocks_added
            );
        }
        MiningEvent::ChainFailed { chain_id, error } => {
            println!(
                "{}  {} failed: {}",
                "✗".red().bold(),
                chain_id.to_string().bright_cyan(),
                error.to_string().red()
            );
        }
    }
}

fn print_block_row(block: &BlockCompleted) {
    let hash = block.hash.to_hex();
    println!(
        "  {:<9} {:<4} {:>6} {:>12} {:>12} {:>8}  {}",
        block.chain_id.to_string().bright_cyan(),
        block.kind.label(),
        block.height,
        format_duration(block.creation_duration),
        format_throughput(block.throughput()),
        block.tx_count * block.tx_size_bytes,
        hash[..16].bright_yellow()
    );
}

fn print_summary(summary: &RunSummary) {
    println!();
    let title = if summary.stopped {
        "Run stopped"
    } else {
        "Run complete"
    };
    println!("{}", title.bold().cyan());
    println!();
    println!(
        "  {:<9} {:<4} {:>6} {:>10} {:>12} {:>12} {:>10}",
        "CHAIN".bold(),
        "KIND".bold(),
        "BLOCKS".bold(),
        "TXS".bold(),
        "AVG TIME".bold(),
        "TPS".bold(),
        "BYTES".bold()
    );
    for stats in &summary.stats {
        println!(
            "  {:<9} {:<4} {:>6} {:>10} {:>12} {:>12} {:>10}",
            stats.chain_id.to_string().bright_cyan(),
            stats.kind.label(),
            stats.blocks,
            stats.total_transactions,
            format_duration(stats.average_block_time),
            format_throughput(stats.throughput),
            stats.total_bytes
        );
    }
    println!();
}

fn print_chain_blocks(chain: &Chain) {
    println!(
        "{}",
        format!("Blocks of {} ({}):", chain.id(), chain.kind())
            .bold()
            .cyan()
    );
    println!();
    for (block, time) in chain.blocks().iter().zip(chain.block_times()) {
        print_block_detail(block, *time);
    }
}

fn print_block_detail(block: &Block, time: Duration) {
    let header = &block.header;
    let target = match &header.target {
        HeaderTarget::Bits(bits) => format!("bits {}", bits),
        HeaderTarget::Difficulty(difficulty) => format!("difficulty {}", difficulty),
    };

    println!("  Height:       {}", block.height.to_string().bright_cyan());
    println!("  Hash:         {}", header.hash.to_hex().bright_yellow());
    println!("  Parent Hash:  {}", header.prev_hash.to_hex().bright_black());
    println!("  Merkle Root:  {}", header.merkle_root.to_hex().bright_black());
    println!("  Version:      {}", header.version);
    println!("  Timestamp:    {}", header.timestamp);
    println!("  Nonce:        {}", header.nonce);
    println!("  Target:       {}", target);
    println!("  Transactions: {}", block.tx_count.to_string().bright_cyan());
    println!("  Size:         {} bytes", block.size);
    if let Some(first) = block.transactions.first() {
        let bits = first.to_bit_string();
        let shown = &bits[..bits.len().min(64)];
        println!("  First Tx:     {}", shown.bright_black());
    }
    println!("  Created in:   {}", format_duration(time));
    println!();
}

fn format_duration(duration: Duration) -> String {
    format!("{:.3}s", duration.as_secs_f64())
}

fn json_report(summary: &RunSummary, coordinator: &MiningCoordinator) -> serde_json::Value {
    let chains: Vec<serde_json::Value> = summary
        .stats
        .iter()
        .map(|stats| {
            let series: Vec<serde_json::Value> = coordinator
                .chain(stats.chain_id)
                .map(|chain| {
                    chain
                        .block_time_series()
                        .into_iter()
                        .map(|(height, time)| {
                            serde_json::json!({
                                "height": height,
                                "seconds": time.as_secs_f64(),
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();

            serde_json::json!({
                "chain": stats.chain_id.to_string(),
                "kind": stats.kind.label(),
                "blocks": stats.blocks,
                "total_transactions": stats.total_transactions,
                "total_bytes": stats.total_bytes,
                "total_seconds": stats.total_time.as_secs_f64(),
                "average_block_seconds": stats.average_block_time.as_secs_f64(),
                "throughput": stats.throughput,
                "block_times": series,
            })
        })
        .collect();

    serde_json::json!({
        "stopped": summary.stopped,
        "chains": chains,
    })
}
