use crate::constants::{DEFAULT_DATA_DIR, DEFAULT_LISTEN};
use anyhow::{ensure, Context, Result};
use clap::Parser;
use ledger_core::constants::{DEFAULT_DIFFICULTY, DEFAULT_MINING_REWARD, MAX_DIFFICULTY};
use std::{net::SocketAddr, path::PathBuf};

#[derive(Parser, Debug, Clone)]
#[command(name = "ledger-node")]
#[command(about = "HTTP node serving a proof-of-work ledger")]
pub struct Args {
    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(long, env = "LEDGER_LISTEN", default_value = DEFAULT_LISTEN)]
    pub listen: String,

    /// Data directory for sled
    #[arg(long, env = "LEDGER_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Leading zero hex digits a block hash needs
    #[arg(long, env = "MINING_DIFFICULTY", default_value_t = DEFAULT_DIFFICULTY)]
    pub difficulty: u32,

    /// Amount paid to the miner of each block
    #[arg(long, env = "MINING_REWARD", default_value_t = DEFAULT_MINING_REWARD)]
    pub mining_reward: f64,

    /// Keep blocks in memory only
    #[arg(long, env = "LEDGER_IN_MEMORY")]
    pub in_memory: bool,
}

/// Ledger parameters shared by startup and reset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedgerParams {
    pub difficulty: u32,
    pub mining_reward: f64,
}

impl LedgerParams {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.difficulty <= MAX_DIFFICULTY,
            "difficulty {} exceeds the {MAX_DIFFICULTY} hex digits of a hash",
            self.difficulty
        );
        ensure!(
            self.mining_reward.is_finite() && self.mining_reward > 0.0,
            "mining reward must be a positive number, got {}",
            self.mining_reward
        );
        Ok(())
    }
}

impl Args {
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen
            .parse()
            .with_context(|| format!("invalid listen address {:?}", self.listen))
    }

    pub fn ledger_params(&self) -> Result<LedgerParams> {
        let params = LedgerParams {
            difficulty: self.difficulty,
            mining_reward: self.mining_reward,
        };
        params.validate()?;
        Ok(params)
    }
}
