//! TOML run files.
//!
//! ```toml
//! blocks = 5
//! pace = 0.1
//!
//! [[chain]]
//! kind = "poa"
//! delay = 0.5
//! tx_size = 100
//!
//! [[chain]]
//! kind = "pow"
//! difficulty = 4
//! tx_size = 100
//! blocks = 3
//! ```

use anyhow::{Context, Result};
use blocksim_chain::config::DEFAULT_TX_SIZE;
use blocksim_chain::{ChainConfig, RunConfig};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunFile {
    /// Blocks per chain unless a chain overrides it.
    pub blocks: Option<usize>,
    /// Seconds to pause between blocks of one chain.
    pub pace: Option<f64>,
    #[serde(default)]
    pub chain: Vec<ChainEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChainEntry {
    Poa {
        #[serde(default)]
        delay: f64,
        #[serde(default = "default_tx_size")]
        tx_size: i64,
        blocks: Option<usize>,
    },
    Pow {
        difficulty: i64,
        #[serde(default = "default_tx_size")]
        tx_size: i64,
        blocks: Option<usize>,
    },
}

fn default_tx_size() -> i64 {
    DEFAULT_TX_SIZE as i64
}

impl ChainEntry {
    pub fn to_config(&self) -> Result<ChainConfig> {
        let (config, blocks) = match *self {
            ChainEntry::Poa {
                delay,
                tx_size,
                blocks,
            } => (ChainConfig::poa_secs(delay, tx_size)?, blocks),
            ChainEntry::Pow {
                difficulty,
                tx_size,
                blocks,
            } => (ChainConfig::pow_signed(difficulty, tx_size)?, blocks),
        };
        Ok(match blocks {
            Some(blocks) => config.with_blocks(blocks),
            None => config,
        })
    }
}

impl RunFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read run file: {:?}", path))?;
        Self::parse(&text).with_context(|| format!("Invalid run file: {:?}", path))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn chain_configs(&self) -> Result<Vec<ChainConfig>> {
        self.chain
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                entry
                    .to_config()
                    .with_context(|| format!("chain #{} in run file", i + 1))
            })
            .collect()
    }

    /// Apply the file's run settings on top of `base`.
    pub fn run_config(&self, base: RunConfig) -> Result<RunConfig> {
        let mut run = base;
        if let Some(blocks) = self.blocks {
            run.blocks_per_chain = blocks;
        }
        if let Some(pace) = self.pace {
            run.pace = parse_pace(pace)?;
        }
        Ok(run)
    }
}

/// Convert a pace given in seconds.
pub fn parse_pace(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .with_context(|| format!("pace must be a non-negative number of seconds, got {}", secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use blocksim_chain::ConsensusParams;
    use std::io::Write;

    const SAMPLE: &str = r#"
blocks = 5
pace = 0.1

[[chain]]
kind = "poa"
delay = 0.5
tx_size = 20

[[chain]]
kind = "pow"
difficulty = 3
blocks = 2
"#;

    #[test]
    fn test_parse_run_file() {
        let file = RunFile::parse(SAMPLE).unwrap();
        let configs = file.chain_configs().unwrap();

        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0], ChainConfig::poa(Duration::from_millis(500), 20));
        assert_eq!(
            configs[1],
            ChainConfig::pow(3, DEFAULT_TX_SIZE).with_blocks(2)
        );

        let run = file.run_config(RunConfig::default()).unwrap();
        assert_eq!(run.blocks_per_chain, 5);
        assert_eq!(run.pace, Duration::from_millis(100));
    }

    #[test]
    fn test_run_file_rejects_bad_values() {
        let file = RunFile::parse("[[chain]]\nkind = \"pow\"\ndifficulty = -1\n").unwrap();
        assert!(file.chain_configs().is_err());

        let file = RunFile::parse("[[chain]]\nkind = \"poa\"\ntx_size = 0\n").unwrap();
        assert!(file.chain_configs().is_err());

        let file = RunFile::parse("pace = -1.0\n").unwrap();
        assert!(file.run_config(RunConfig::default()).is_err());
    }

    #[test]
    fn test_run_file_rejects_unknown_kind() {
        assert!(RunFile::parse("[[chain]]\nkind = \"pos\"\n").is_err());
        assert!(RunFile::parse("blocks = 3\nspeed = 3\n").is_err());
    }

    #[test]
    fn test_poa_defaults() {
        let file = RunFile::parse("[[chain]]\nkind = \"poa\"\n").unwrap();
        let configs = file.chain_configs().unwrap();
        assert_eq!(
            configs[0].consensus,
            ConsensusParams::ProofOfAuthority {
                validation_delay: Duration::ZERO
            }
        );
        assert_eq!(configs[0].tx_size, DEFAULT_TX_SIZE);
        assert!(file.run_config(RunConfig::new(7)).unwrap().blocks_per_chain == 7);
    }

    #[test]
    fn test_load_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let loaded = RunFile::load(file.path()).unwrap();
        assert_eq!(loaded.chain.len(), 2);
        assert!(RunFile::load(Path::new("/nonexistent/run.toml")).is_err());
    }
}
