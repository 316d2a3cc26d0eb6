//! The neo-oxide node binary.

mod console;
mod system;
mod wallet;

use anyhow::Result;
use clap::{Parser, Subcommand};
use oxneo_config::NodeConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "oxneo-node", version, about = "neo-oxide full node")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the node with an interactive console.
    Start {
        /// TOML configuration file; defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Create a new wallet file.
    Createwallet {
        /// Where to write the wallet.
        path: PathBuf,
    },
    /// Inspect an existing wallet file.
    Openwallet {
        /// The wallet to open.
        path: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("fatal: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Start { config } => {
            let config = match config {
                Some(path) => NodeConfig::load(&path)?,
                None => NodeConfig::default(),
            };
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(run_node(config))
        }
        Command::Createwallet { path } => {
            let pair = wallet::create(&path)?;
            println!("wallet written to {}", path.display());
            println!("address: {}", wallet::address_of(&pair));
            Ok(())
        }
        Command::Openwallet { path } => {
            let pair = wallet::open(&path)?;
            println!("address: {}", wallet::address_of(&pair));
            println!("public key: {}", hex::encode(pair.public_key()));
            Ok(())
        }
    }
}

async fn run_node(config: NodeConfig) -> Result<()> {
    let system = system::NeoSystem::new(config)?;
    system.start().await?;
    tracing::info!(height = system.blockchain.height(), "node started");

    tokio::select! {
        result = console::run(&system) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received");
        }
    }
    system.shutdown();
    // Give in-flight tasks a moment to observe the signal.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    Ok(())
}
