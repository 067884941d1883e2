use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ledger_core::{crypto::KeyPair, Transaction};
use serde_json::{json, Value};
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ledger-cli")]
#[command(about = "CLI client for a ledger node")]
struct Cli {
    /// Node base URL (e.g. http://127.0.0.1:8080)
    #[arg(long, global = true, env = "LEDGER_NODE_URL", default_value = "http://127.0.0.1:8080")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the node's chain
    Blocks,
    /// Mine a block, optionally carrying transactions
    Mine {
        /// JSON file holding an array of transactions
        #[arg(long)]
        txns: Option<PathBuf>,
    },
    /// List the node's cluster members
    Peers,
    /// Show the chain tip, difficulty and cumulative work
    Head,
    /// Ask the node to pull a chain from a peer
    Sync {
        /// Peer id; the node picks one when omitted
        #[arg(long)]
        peer: Option<String>,
    },
    /// Generate a P-256 key pair for signing inputs
    Keygen,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let node = cli.node.trim_end_matches('/');

    let body = match cli.cmd {
        Command::Blocks => get(&client, &format!("{node}/blocks")).await?,
        Command::Mine { txns } => {
            let data: Vec<Transaction> = match txns {
                Some(path) => {
                    let raw = std::fs::read(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    serde_json::from_slice(&raw)
                        .with_context(|| format!("{} is not a transaction array", path.display()))?
                }
                None => Vec::new(),
            };
            debug!(count = data.len(), "mining with transactions");
            post(&client, &format!("{node}/mine"), json!(data)).await?
        }
        Command::Peers => get(&client, &format!("{node}/peers")).await?,
        Command::Head => get(&client, &format!("{node}/chain/head")).await?,
        Command::Sync { peer } => {
            post(&client, &format!("{node}/sync"), json!({ "peer_id": peer })).await?
        }
        Command::Keygen => {
            let key = KeyPair::generate()?;
            json!({
                "public_key": key.public_key_hex(),
                "private_key_pkcs8": key.pkcs8_hex(),
            })
        }
    };
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

async fn get(client: &reqwest::Client, url: &str) -> Result<Value> {
    read(client.get(url).send().await?).await
}

async fn post(client: &reqwest::Client, url: &str, body: Value) -> Result<Value> {
    read(client.post(url).json(&body).send().await?).await
}

async fn read(res: reqwest::Response) -> Result<Value> {
    let status = res.status();
    let body: Value = res.json().await.context("node returned a non-JSON body")?;
    if !status.is_success() {
        bail!("node answered {status}: {body}");
    }
    Ok(body)
}
