use std::path::PathBuf;
use std::str::FromStr;

use alloy::primitives::Address;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "dapp-tui", about = "Terminal panel for deployed smart-contract instances")]
pub struct Config {
    /// RPC endpoint URL of a node holding unlocked accounts
    #[arg(short, long, default_value = "http://127.0.0.1:8545")]
    pub rpc_url: String,

    /// Etherscan API key (optional, for ABI resolution of attached addresses)
    #[arg(long, env = "ETHERSCAN_API_KEY")]
    pub etherscan_api_key: Option<String>,

    /// Compiler artifact or directory of artifacts to load (repeatable)
    #[arg(short, long = "contract", value_name = "PATH")]
    pub contracts: Vec<PathBuf>,

    /// Attach an instance: NAME@ADDRESS for a loaded contract, or ADDRESS to
    /// look the ABI up remotely (repeatable)
    #[arg(long = "at", value_name = "[NAME@]ADDRESS")]
    pub attach: Vec<AttachTarget>,

    /// Deploy a loaded contract: NAME or NAME=ARG1,ARG2 (repeatable)
    #[arg(long, value_name = "NAME[=ARGS]")]
    pub deploy: Vec<DeployTarget>,

    /// Sender account (defaults to the node's first account)
    #[arg(long)]
    pub from: Option<Address>,

    /// Treat the node as a simulated VM and report VM errors
    /// (on by default for local dev chains)
    #[arg(long)]
    pub vm: bool,

    /// Tick rate in milliseconds for UI refresh
    #[arg(long, default_value = "100")]
    pub tick_rate_ms: u64,

    /// Log file (defaults to the local data directory)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Config {
    pub fn log_path(&self) -> PathBuf {
        self.log_file.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("dapp-tui")
                .join("dapp-tui.log")
        })
    }
}

/// `--at` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachTarget {
    pub name: Option<String>,
    pub address: Address,
}

impl FromStr for AttachTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, address) = match s.split_once('@') {
            Some((name, address)) if !name.trim().is_empty() => (Some(name.trim().to_string()), address),
            Some(_) => return Err(format!("missing contract name in '{s}'")),
            None => (None, s),
        };
        let address = address
            .trim()
            .parse::<Address>()
            .map_err(|e| format!("invalid address '{}': {e}", address.trim()))?;
        Ok(Self { name, address })
    }
}

/// `--deploy` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployTarget {
    pub name: String,
    /// Constructor arguments as typed, comma separated.
    pub args: String,
}

impl FromStr for DeployTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, args) = s.split_once('=').unwrap_or((s, ""));
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("missing contract name in '{s}'"));
        }
        Ok(Self {
            name: name.to_string(),
            args: args.trim().to_string(),
        })
    }
}
