mod app;
mod components;
mod config;
mod data;
mod events;
mod invocation;
mod theme;
mod utils;

use std::fs::{self, File};
use std::path::Path;
use std::sync::{Arc, Mutex};

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::app::App;
use crate::config::Config;
use crate::data::DappService;
use crate::data::artifacts::ContractRegistry;
use crate::data::backend::{Backend, RpcBackend};
use crate::data::provider::EthProvider;
use crate::data::tx_format::parse_arg_list;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let config = Config::parse();
    init_tracing(&config.log_path())?;

    // Load compiler artifacts
    let mut registry = ContractRegistry::default();
    for path in &config.contracts {
        let loaded = registry
            .load_path(path)
            .wrap_err_with(|| format!("loading {}", path.display()))?;
        eprintln!("Loaded {loaded} contract(s) from {}", path.display());
    }
    if !registry.is_empty() {
        info!(
            count = registry.len(),
            contracts = ?registry.names().collect::<Vec<_>>(),
            "artifacts loaded"
        );
    }

    // Connect to the Ethereum node
    eprintln!("Connecting to {}...", config.rpc_url);
    let provider = EthProvider::connect(&config.rpc_url).await?;
    let backend = RpcBackend::new(provider, &config.rpc_url, config.from, config.vm).await?;
    let context = backend.context().clone();
    eprintln!(
        "Connected to chain {} as {} ({})",
        context.chain_id,
        utils::format_address(&context.from),
        context.label()
    );
    info!(rpc_url = %config.rpc_url, chain_id = context.chain_id, "connected");

    // Create event channel
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let service = Arc::new(DappService::new(
        Arc::new(backend),
        registry,
        config.etherscan_api_key.clone(),
        event_tx,
    ));

    // Instances requested on the command line
    for target in &config.attach {
        match &target.name {
            Some(name) => service.attach(name, target.address),
            None => service.attach_remote(target.address),
        }
    }
    for target in &config.deploy {
        service.deploy(target.name.clone(), parse_arg_list(&target.args));
    }

    let mut app = App::new(Arc::clone(&service), event_rx, config.tick_rate_ms);

    // Initialize terminal
    let terminal = ratatui::init();
    let result = app.run(terminal).await;

    // Restore terminal
    ratatui::restore();

    result
}

/// Log to a file: the terminal belongs to the UI.
fn init_tracing(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).wrap_err_with(|| format!("creating {}", dir.display()))?;
    }
    let file = File::options()
        .create(true)
        .append(true)
        .open(path)
        .wrap_err_with(|| format!("opening log file {}", path.display()))?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        warn!("tracing subscriber already installed");
    }
    Ok(())
}
