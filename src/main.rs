//! Wallet session CLI
//!
//! Command-line front end for the wallet session manager. Every invocation is
//! its own process, so commands that need the key (transfers, export) unlock
//! the remembered keystore first.

use clap::{Parser, Subcommand};
use keystore_session::{Config, Error, Result, WalletService};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "wallet-session")]
#[command(about = "Single-account Ethereum wallet session manager")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory (overrides config and WALLET_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Keystore passphrase
    #[arg(long, global = true, env = "WALLET_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Remember the node endpoint
    SetEndpoint {
        /// Endpoint URL; empty clears it
        url: String,

        /// Treat the caller as a returning user
        #[arg(long)]
        returning: bool,
    },

    /// Erase the keystore and remembered settings
    Reset,

    /// Unlock the remembered keystore
    Unlock,

    /// Generate a fresh 12-word mnemonic
    GenerateMnemonic,

    /// Import a hex-encoded private key
    ImportKey {
        /// Private key (hex, with or without 0x)
        #[arg(long, env = "WALLET_PRIVATE_KEY", hide_env_values = true)]
        key: String,
    },

    /// Import the first account of a mnemonic
    ImportMnemonic {
        /// Space-separated mnemonic words
        #[arg(long, env = "WALLET_MNEMONIC", hide_env_values = true)]
        mnemonic: String,
    },

    /// Print the unlocked account's private key
    ExportKey,

    /// Transfer native currency
    TransferNative {
        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,

        /// Amount in wei
        #[arg(long)]
        value: String,

        /// Gas price in wei
        #[arg(long)]
        gas_price: String,
    },

    /// Transfer ERC-20 tokens
    TransferToken {
        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,

        /// Token contract address
        #[arg(long)]
        token: String,

        /// Amount in the token's smallest unit
        #[arg(long)]
        value: String,

        /// Gas price in wei
        #[arg(long)]
        gas_price: String,
    },

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the JSON result
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match run(cli).await {
        Ok(output) => {
            print_json(&output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            print_json(&e.to_payload());
            ExitCode::FAILURE
        }
    }
}

fn print_json(value: &impl Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("failed to render output: {}", e),
    }
}

fn load_config(path: Option<&PathBuf>, data_dir: Option<PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let mut config = config.with_env_overrides();
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    Ok(config)
}

fn require_passphrase(passphrase: Option<String>) -> Result<SecretString> {
    passphrase
        .map(SecretString::from)
        .ok_or_else(|| {
            Error::InvalidArgument(
                "passphrase required (--passphrase or WALLET_PASSPHRASE)".to_string(),
            )
        })
}

async fn run(cli: Cli) -> Result<Value> {
    let config = load_config(cli.config.as_ref(), cli.data_dir)?;
    let service = WalletService::new(config)?;

    match cli.command {
        Commands::SetEndpoint { url, returning } => {
            service.set_endpoint(returning, &url).await?;
            Ok(json!({ "endpoint": url }))
        }
        Commands::Reset => {
            service.reset().await;
            Ok(json!({ "reset": true }))
        }
        Commands::Unlock => {
            let passphrase = require_passphrase(cli.passphrase)?;
            let account = service.unlock(&passphrase).await?;
            Ok(json!({ "address": account.address }))
        }
        Commands::GenerateMnemonic => {
            let generated = service.generate_mnemonic().await?;
            Ok(json!({ "mnemonic": generated.mnemonic.expose_secret() }))
        }
        Commands::ImportKey { key } => {
            let passphrase = require_passphrase(cli.passphrase)?;
            let account = service
                .import_private_key(&SecretString::from(key), &passphrase)
                .await?;
            Ok(json!({ "address": account.address }))
        }
        Commands::ImportMnemonic { mnemonic } => {
            let passphrase = require_passphrase(cli.passphrase)?;
            let account = service
                .import_mnemonic(&SecretString::from(mnemonic), &passphrase)
                .await?;
            Ok(json!({ "address": account.address }))
        }
        Commands::ExportKey => {
            let passphrase = require_passphrase(cli.passphrase)?;
            service.unlock(&passphrase).await?;
            let exported = service.export_private_key(&passphrase).await?;
            Ok(json!({ "privateKey": exported.private_key.expose_secret() }))
        }
        Commands::TransferNative {
            from,
            to,
            value,
            gas_price,
        } => {
            let passphrase = require_passphrase(cli.passphrase)?;
            service.unlock(&passphrase).await?;
            let receipt = service
                .transfer_native(&passphrase, &from, &to, &value, &gas_price)
                .await?;
            Ok(json!({ "txHash": receipt.tx_hash }))
        }
        Commands::TransferToken {
            from,
            to,
            token,
            value,
            gas_price,
        } => {
            let passphrase = require_passphrase(cli.passphrase)?;
            service.unlock(&passphrase).await?;
            let receipt = service
                .transfer_token(&passphrase, &from, &to, &token, &value, &gas_price)
                .await?;
            Ok(json!({ "txHash": receipt.tx_hash }))
        }
        Commands::Config => {
            serde_json::to_value(service.config()).map_err(|e| Error::Config(e.to_string()))
        }
    }
}
