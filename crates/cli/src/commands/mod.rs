//! CLI commands module.

use anyhow::Result;
use clap::Subcommand;

mod hash;
mod run;
mod runfile;

#[derive(Subcommand)]
pub enum Commands {
    /// Mine one or more chains concurrently
    Run(run::RunArgs),
    /// Hash a string the way block headers are hashed
    Digest(hash::DigestArgs),
    /// Compute the Merkle root of a list of transactions
    Merkle(hash::MerkleArgs),
}

pub async fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Run(args) => run::run(args).await,
        Commands::Digest(args) => hash::digest(args),
        Commands::Merkle(args) => hash::merkle(args),
    }
}
