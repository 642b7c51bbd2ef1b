//! Hashing and Merkle utilities.

use anyhow::{Context, Result};
use blocksim_core::{digest_hex, merkle_levels, ConsensusKind, HashMode, Transaction};
use clap::{Args, ValueEnum};
use colored::Colorize;

#[derive(Clone, Copy, ValueEnum)]
pub enum ModeArg {
    /// One SHA-256 round, as PoW headers use
    Pow,
    /// Two SHA-256 rounds, as PoA headers use
    Poa,
}

impl ModeArg {
    fn kind(self) -> ConsensusKind {
        match self {
            ModeArg::Pow => ConsensusKind::ProofOfWork,
            ModeArg::Poa => ConsensusKind::ProofOfAuthority,
        }
    }

    fn hash_mode(self) -> HashMode {
        self.kind().hash_mode()
    }
}

#[derive(Args)]
pub struct DigestArgs {
    /// Text to hash
    input: String,

    /// Hashing rule to apply
    #[arg(short, long, value_enum, default_value = "pow")]
    mode: ModeArg,
}

#[derive(Args)]
pub struct MerkleArgs {
    /// Transactions, one argument each
    #[arg(required = true)]
    transactions: Vec<String>,

    /// Hashing rule to apply
    #[arg(short, long, value_enum, default_value = "pow")]
    mode: ModeArg,

    /// Print every level of the tree, not just the root
    #[arg(short, long)]
    levels: bool,
}

pub fn digest(args: DigestArgs) -> Result<()> {
    let hex = digest_hex(args.mode.hash_mode(), args.input.as_bytes());
    println!("{}", hex.bright_yellow());
    Ok(())
}

pub fn merkle(args: MerkleArgs) -> Result<()> {
    let transactions: Vec<Transaction> = args
        .transactions
        .iter()
        .map(|tx| Transaction::from_bytes(tx.as_bytes().to_vec()))
        .collect();

    let levels = merkle_levels(args.mode.hash_mode(), &transactions)
        .context("Failed to build Merkle tree")?;
    let root = levels
        .last()
        .and_then(|level| level.first())
        .context("Merkle tree has no root")?;

    if args.levels {
        println!();
        println!(
            "{}",
            format!("Merkle tree ({}):", args.mode.kind()).bold().cyan()
        );
        println!();
        for (depth, level) in levels.iter().enumerate() {
            println!("  {}", format!("Level {}:", depth).bold());
            for hash in level {
                println!("    {}", hash.to_hex().bright_black());
            }
        }
        println!();
        println!("  Root: {}", root.to_hex().bright_yellow());
        println!();
    } else {
        println!("{}", root.to_hex().bright_yellow());
    }

    Ok(())
}
