//! apctl - anonymity mining operator tool
//!
//! Commands:
//! - keygen: fresh account encryption keypair
//! - note: inspect a deposit note
//! - sync: rebuild the three trees from chain events
//! - scan: find the latest unspent account for a key
//! - reward / withdraw / tree-update: build proofs and print calldata

mod config;

use std::path::PathBuf;
use std::str::FromStr;

use alloy_primitives::{Address, B256, U256};
use anyhow::{anyhow, Context, Result};
use ap_client::{
    latest_unspent, owned_accounts, CommandProver, Controller, EventSource, Forest,
    RewardRequest, RpcEventSource, WithdrawRequest,
};
use ap_core::field::{u256_to_word, word_to_u256};
use ap_core::{Account, EncryptionKeypair, Note};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;

use crate::config::{AppConfig, Overrides};

#[derive(Parser, Debug)]
#[command(name = "apctl")]
#[command(about = "anonymity mining operator tool", long_about = None)]
struct Cli {
    /// json config file, flags override its fields
    #[arg(long, env = "AP_CONFIG")]
    config: Option<PathBuf>,

    /// ethereum JSON-RPC endpoint
    #[arg(long, env = "AP_RPC_URL")]
    rpc_url: Option<String>,

    /// miner contract (rates, NewAccount events)
    #[arg(long, env = "AP_MINER_ADDRESS")]
    miner_address: Option<Address>,

    /// trees contract (DepositData/WithdrawalData events)
    #[arg(long, env = "AP_TREES_ADDRESS")]
    trees_address: Option<Address>,

    /// first block to scan for events
    #[arg(long)]
    from_block: Option<u64>,

    /// merkle tree height
    #[arg(long)]
    tree_height: Option<usize>,

    /// prover program, invoked as `<prover> <circuit> <input.json> <proof.out>`
    #[arg(long, env = "AP_PROVER")]
    prover: Option<PathBuf>,

    /// account encryption secret key (hex)
    #[arg(long, env = "AP_PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate an account encryption keypair
    Keygen,

    /// Show the hashes behind a note string
    Note {
        /// tornado-<currency>-<amount>-<netId>-0x<hex>
        note: String,
        /// pool instance the note was deposited into
        #[arg(long)]
        instance: Address,
        #[arg(long)]
        deposit_block: u64,
        #[arg(long)]
        withdrawal_block: u64,
    },

    /// Sync deposit, withdrawal and account trees and print their roots
    Sync,

    /// Decrypt published accounts and report the live one
    Scan {
        /// list every owned account, not only the latest unspent one
        #[arg(long)]
        all: bool,
    },

    /// Prove an AP reward claim for a note
    Reward {
        note: String,
        #[arg(long)]
        instance: Address,
        #[arg(long)]
        deposit_block: u64,
        #[arg(long)]
        withdrawal_block: u64,
        /// relayer fee in AP
        #[arg(long, default_value = "0")]
        fee: String,
        #[arg(long, default_value_t = Address::ZERO)]
        relayer: Address,
    },

    /// Prove a withdrawal from the live account
    Withdraw {
        /// AP amount to send to the recipient
        #[arg(long)]
        amount: String,
        #[arg(long)]
        recipient: Address,
        #[arg(long, default_value = "0")]
        fee: String,
        #[arg(long, default_value_t = Address::ZERO)]
        relayer: Address,
    },

    /// Prove insertion of an account commitment into the current tree
    TreeUpdate {
        /// output commitment of the rejected proof (0x hex)
        commitment: B256,
    },
}

fn parse_amount(value: &str) -> Result<U256> {
    U256::from_str(value).map_err(|e| anyhow!("invalid amount {}: {}", value, e))
}

fn keys(cli: &Cli) -> Result<EncryptionKeypair> {
    let secret = cli
        .private_key
        .as_deref()
        .ok_or_else(|| anyhow!("--private-key (or AP_PRIVATE_KEY) required"))?;
    Ok(EncryptionKeypair::from_hex(secret)?)
}

fn print(value: serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "apctl=info,ap_client=info,ap_ledger=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::resolve(
        cli.config.as_deref(),
        Overrides {
            rpc_url: cli.rpc_url.clone(),
            miner_address: cli.miner_address,
            trees_address: cli.trees_address,
            from_block: cli.from_block,
            tree_height: cli.tree_height,
            prover: cli.prover.clone(),
        },
    )?;

    match &cli.command {
        Commands::Keygen => cmd_keygen(),
        Commands::Note {
            note,
            instance,
            deposit_block,
            withdrawal_block,
        } => cmd_note(note, *instance, *deposit_block, *withdrawal_block),
        Commands::Sync => cmd_sync(&config).await,
        Commands::Scan { all } => cmd_scan(&config, &keys(&cli)?, *all).await,
        Commands::Reward {
            note,
            instance,
            deposit_block,
            withdrawal_block,
            fee,
            relayer,
        } => {
            let note = Note::from_note_string(note, *instance, *deposit_block, *withdrawal_block)?;
            cmd_reward(&config, &keys(&cli)?, note, parse_amount(fee)?, *relayer).await
        }
        Commands::Withdraw {
            amount,
            recipient,
            fee,
            relayer,
        } => {
            cmd_withdraw(
                &config,
                &keys(&cli)?,
                parse_amount(amount)?,
                *recipient,
                parse_amount(fee)?,
                *relayer,
            )
            .await
        }
        Commands::TreeUpdate { commitment } => cmd_tree_update(&config, *commitment).await,
    }
}

type RpcController = Controller<RpcEventSource, CommandProver, RpcEventSource>;

fn controller(config: &AppConfig) -> Result<RpcController> {
    let source = RpcEventSource::new(config.rpc()?.clone());
    let prover = CommandProver::new(config.prover()?.clone());
    Ok(Controller::new(
        source.clone(),
        prover,
        source,
        config.controller.clone(),
    )?)
}

/// latest unspent account for `keys`, or a fresh zero account
async fn live_account(source: &RpcEventSource, keys: &EncryptionKeypair) -> Result<Account> {
    let events = source.account_events(0).await?;
    match latest_unspent(keys, &events) {
        Some(owned) => Ok(owned.account),
        None => {
            info!("starting from a zero account");
            Ok(Account::zero()?)
        }
    }
}

fn cmd_keygen() -> Result<()> {
    let keys = EncryptionKeypair::generate();
    print(json!({
        "private_key": keys.secret_hex(),
        "public_key": keys.public_key().to_base64(),
    }))
}

fn cmd_note(note: &str, instance: Address, deposit_block: u64, withdrawal_block: u64) -> Result<()> {
    let note = Note::from_note_string(note, instance, deposit_block, withdrawal_block)
        .context("parsing note")?;
    print(json!({
        "instance": note.instance,
        "commitment": u256_to_word(note.commitment),
        "nullifier_hash": u256_to_word(note.nullifier_hash),
        "reward_nullifier": u256_to_word(note.reward_nullifier),
        "mining_blocks": note.mining_interval().to_string(),
    }))
}

async fn cmd_sync(config: &AppConfig) -> Result<()> {
    let source = RpcEventSource::new(config.rpc()?.clone());
    let mut forest = Forest::new(config.controller.tree_height)?;
    let report = forest.sync(&source).await?;
    info!(
        deposits = report.deposits,
        withdrawals = report.withdrawals,
        accounts = report.accounts,
        "synced"
    );
    print(json!({
        "deposit_root": u256_to_word(forest.deposits().root()),
        "deposit_count": forest.deposits().len(),
        "withdrawal_root": u256_to_word(forest.withdrawals().root()),
        "withdrawal_count": forest.withdrawals().len(),
        "account_root": u256_to_word(forest.accounts().root()),
        "account_count": forest.accounts().len(),
    }))
}

async fn cmd_scan(config: &AppConfig, keys: &EncryptionKeypair, all: bool) -> Result<()> {
    let source = RpcEventSource::new(config.rpc()?.clone());
    let events = source.account_events(0).await?;
    if all {
        let owned: Vec<_> = owned_accounts(keys, &events)
            .into_iter()
            .map(|o| json!({ "index": o.index, "amount": o.account.amount.to_string() }))
            .collect();
        return print(json!(owned));
    }
    match latest_unspent(keys, &events) {
        Some(owned) => print(json!({
            "index": owned.index,
            "amount": owned.account.amount.to_string(),
            "commitment": u256_to_word(owned.account.commitment),
        })),
        None => print(json!(null)),
    }
}

async fn cmd_reward(
    config: &AppConfig,
    keys: &EncryptionKeypair,
    note: Note,
    fee: U256,
    relayer: Address,
) -> Result<()> {
    let mut controller = controller(config)?;
    let account = live_account(controller.source(), keys).await?;
    let proof = controller
        .reward(RewardRequest {
            account,
            note,
            public_key: keys.public_key(),
            fee,
            relayer,
        })
        .await?;
    print(json!({
        "amount": proof.account.amount.to_string(),
        "commitment": u256_to_word(proof.account.commitment),
        "args": &proof.args,
        "calldata": proof.calldata(None),
    }))
}

async fn cmd_withdraw(
    config: &AppConfig,
    keys: &EncryptionKeypair,
    amount: U256,
    recipient: Address,
    fee: U256,
    relayer: Address,
) -> Result<()> {
    let mut controller = controller(config)?;
    let account = live_account(controller.source(), keys).await?;
    let proof = controller
        .withdraw(WithdrawRequest {
            account,
            amount,
            recipient,
            public_key: keys.public_key(),
            fee,
            relayer,
        })
        .await?;
    print(json!({
        "remaining": proof.account.amount.to_string(),
        "commitment": u256_to_word(proof.account.commitment),
        "args": &proof.args,
        "calldata": proof.calldata(None),
    }))
}

async fn cmd_tree_update(config: &AppConfig, commitment: B256) -> Result<()> {
    let mut controller = controller(config)?;
    let update = controller
        .tree_update(word_to_u256(commitment), None)
        .await?;
    print(json!({
        "proof": update.proof,
        "args": update.args,
    }))
}
