mod config;
mod ethereum;
mod server;

use anyhow::{anyhow, Result};
use clap::{Arg, Command};
use config::Config;
use ethereum::inspector::ContractInspector;
use server::ContractInspectorServer;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the MCP transport, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let matches = Command::new("contract-inspector")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Read-only smart contract inspector with an MCP tool interface")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to configuration file"),
        )
        .arg(
            Arg::new("rpc-url")
                .short('r')
                .long("rpc-url")
                .value_name("URL")
                .help("JSON-RPC endpoint URL"),
        )
        .arg(
            Arg::new("chain-id")
                .long("chain-id")
                .value_name("ID")
                .value_parser(clap::value_parser!(u64))
                .help("Chain id passed to the explorer API"),
        )
        .arg(
            Arg::new("inspect")
                .long("inspect")
                .value_name("ADDRESS")
                .conflicts_with("summary")
                .help("Inspect one contract, print the report and exit"),
        )
        .arg(
            Arg::new("summary")
                .long("summary")
                .value_name("ADDRESS")
                .help("Print a quick summary of one address and exit"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .help("Generate a sample configuration file and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("save-config")
                .long("save-config")
                .help("Write the effective configuration to the config file (or the default path) and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config-path")
                .long("config-path")
                .help("Print the default configuration file path and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    if matches.get_flag("generate-config") {
        println!("{}", Config::generate_sample());
        return Ok(());
    }

    if matches.get_flag("config-path") {
        match Config::default_config_path() {
            Ok(path) => {
                println!("{}", path.display());
                return Ok(());
            }
            Err(e) => {
                error!("Could not determine default config path: {}", e);
                return Err(e);
            }
        }
    }

    let config_path = matches.get_one::<String>("config").map(|s| s.as_str());
    let mut config = Config::load_or_default(config_path).await;

    if let Some(rpc_url) = matches.get_one::<String>("rpc-url") {
        config.rpc.url = rpc_url.clone();
    }

    if let Some(chain_id) = matches.get_one::<u64>("chain-id") {
        config.explorer.chain_id = *chain_id;
    }

    config.validate()?;

    if matches.get_flag("save-config") {
        let path = match config_path {
            Some(path) => std::path::PathBuf::from(path),
            None => Config::default_config_path()?,
        };
        config.save_to_file(&path).await?;
        info!("Configuration written to {}", path.display());
        return Ok(());
    }

    info!("RPC endpoint: {}", config.rpc.url);
    info!(
        "Explorer: {} (chain {})",
        config.explorer.base_url, config.explorer.chain_id
    );

    if let Some(address) = matches.get_one::<String>("inspect") {
        let inspector = ContractInspector::new(&config)?;
        let report = inspector.inspect(address).await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if let Some(address) = matches.get_one::<String>("summary") {
        let inspector = ContractInspector::new(&config)?;
        let summary = inspector.summarize(address).await;
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let server = ContractInspectorServer::new(&config)
        .map_err(|e| anyhow!("Failed to start contract inspector: {}", e))?;

    if let Err(e) = server.run().await {
        error!("Server error: {}", e);
        return Err(e);
    }

    Ok(())
}
