use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pl_proto::AppInfo;
use pl_session::SessionConfig;

mod commands;
mod dapp;
mod paths;
mod signer;
mod wallet;

pub const PROD_RELAY: &str = "wss://relay.pairlink.app/v1";
pub const DEV_RELAY: &str = "ws://127.0.0.1:8787/v1";

#[derive(Parser, Debug)]
#[command(author, version, about = "pairlink wallet/dApp pairing over a relay", long_about = None)]
struct Cli {
    /// Use the development relay
    #[arg(long, global = true)]
    dev: bool,

    /// Relay address (overrides --dev and PAIRLINK_RELAY_URL)
    #[arg(long, global = true)]
    relay: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a session and send requests as the dApp
    Dapp {
        /// Application name shown to the wallet
        #[arg(long, default_value = "pairlink demo")]
        name: String,
        #[arg(long, default_value = "https://localhost")]
        url: String,
    },
    /// Join a session as the wallet and answer requests
    Wallet {
        /// Pairing code printed by the dApp
        code: Option<String>,
        /// Resume the stored session instead of pairing
        #[arg(long, conflicts_with = "code")]
        restore: bool,
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Approve every request with the demo signer
        #[arg(long)]
        auto_approve: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("pairlink_cli=info,pl_session=info,pl_store=info")
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let default_relay = if cli.dev { DEV_RELAY } else { PROD_RELAY };
    let mut config = SessionConfig::from_env(default_relay);
    if let Some(relay) = cli.relay {
        config.relay_address = relay;
    }

    match cli.command {
        Commands::Dapp { name, url } => {
            let app = AppInfo {
                name,
                url,
                icon: None,
                description: None,
            };
            dapp::run(config, app).await
        }
        Commands::Wallet {
            code,
            restore,
            data_dir,
            auto_approve,
        } => {
            let data_dir = match data_dir {
                Some(dir) => dir,
                None => paths::data_dir()?,
            };
            wallet::run(config, code, restore, data_dir, auto_approve).await
        }
    }
}
