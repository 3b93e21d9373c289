use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::{arg, ArgAction, ArgMatches, Command};
use log::{info, warn};
use tokio::time;

use crate::block::Block;
use crate::config::{NodeConfig, BLOCKCHAIN_NEIGHBOR_SYNC_TIME_SEC, REQUEST_TIMEOUT_MS};
use crate::crypto::KeyPair;
use crate::message::{Request, Response};
use crate::network;
use crate::node::Node;
use crate::server::{self, Server};
use crate::transaction::TransactionRequest;

const DEFAULT_NODE: &str = "/ip4/127.0.0.1/tcp/7000";
/// A wallet call may wait on the node's own relay to its peers.
const CLIENT_TIMEOUT_MS: u64 = 3 * REQUEST_TIMEOUT_MS;

pub struct Cli {}

impl Cli {
    pub fn new() -> Result<Cli, Box<dyn std::error::Error>> {
        Ok(Cli {})
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let node_arg = || {
            arg!(-n --node <ADDR> "multiaddr of the node to ask")
                .required(false)
                .default_value(DEFAULT_NODE)
        };
        let matches = Command::new("zero-ledger")
            .version("0.1")
            .about("a minimal proof-of-work ledger node")
            .subcommand_required(true)
            .subcommand(
                Command::new("startnode")
                    .about("start a ledger node")
                    .arg(arg!(-c --config <FILE> "JSON config file").required(false))
                    .arg(arg!(-a --address <ADDRESS> "address credited with mining rewards").required(false))
                    .arg(arg!(-l --listen <ADDR> "multiaddr to listen on").required(false))
                    .arg(
                        arg!(-p --peer <ADDR> "bootstrap peer multiaddr, repeatable")
                            .required(false)
                            .action(ArgAction::Append),
                    )
                    .arg(arg!(-d --difficulty <N> "leading zero hex characters per proof").required(false))
                    .arg(arg!(--interval <SECS> "seconds between mining cycles, 0 disables").required(false)),
            )
            .subcommand(Command::new("createkeys").about("generate a P-256 key pair"))
            .subcommand(
                Command::new("send")
                    .about("sign a transfer and hand it to a node")
                    .arg(arg!(<FROM> "Source wallet address"))
                    .arg(arg!(<TO> "Destination wallet address"))
                    .arg(arg!(<AMOUNT> "amount to send"))
                    .arg(arg!(<PRIVATE_KEY> "hex private key signing the transfer"))
                    .arg(node_arg()),
            )
            .subcommand(
                Command::new("getbalance")
                    .about("get the confirmed balance of an address")
                    .arg(arg!(<ADDRESS> "The Address it get balance for"))
                    .arg(node_arg()),
            )
            .subcommand(
                Command::new("printchain")
                    .about("print all blocks in the chain")
                    .arg(node_arg()),
            )
            .subcommand(
                Command::new("listtransactions")
                    .about("print the pending transactions of a node")
                    .arg(node_arg()),
            )
            .get_matches();

        match matches.subcommand() {
            Some(("startnode", matches)) => cmd_start_node(node_config(matches)?).await,
            Some(("createkeys", _)) => {
                cmd_create_keys();
                Ok(())
            }
            Some(("send", matches)) => {
                let from = required(matches, "FROM")?;
                let to = required(matches, "TO")?;
                let amount: f64 = required(matches, "AMOUNT")?.parse()?;
                let private_key = required(matches, "PRIVATE_KEY")?;
                cmd_send(required(matches, "node")?, from, to, amount, private_key).await
            }
            Some(("getbalance", matches)) => {
                let address = required(matches, "ADDRESS")?;
                cmd_get_balance(required(matches, "node")?, address).await
            }
            Some(("printchain", matches)) => cmd_print_chain(required(matches, "node")?).await,
            Some(("listtransactions", matches)) => {
                cmd_list_transactions(required(matches, "node")?).await
            }
            _ => Ok(()),
        }
    }
}

fn required<'a>(matches: &'a ArgMatches, id: &str) -> Result<&'a String, Box<dyn std::error::Error>> {
    matches
        .get_one::<String>(id)
        .ok_or_else(|| format!("missing argument {id}").into())
}

/// Config file first, then command-line overrides.
fn node_config(matches: &ArgMatches) -> Result<NodeConfig, Box<dyn std::error::Error>> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => NodeConfig::load(Path::new(path))?,
        None => NodeConfig::default(),
    };
    if let Some(address) = matches.get_one::<String>("address") {
        config.miner_address = address.clone();
    }
    if let Some(listen) = matches.get_one::<String>("listen") {
        config.listen_addr = listen.clone();
    }
    if let Some(peers) = matches.get_many::<String>("peer") {
        config.bootstrap.extend(peers.cloned());
    }
    if let Some(difficulty) = matches.get_one::<String>("difficulty") {
        config.difficulty = difficulty.parse()?;
    }
    if let Some(interval) = matches.get_one::<String>("interval") {
        config.mining_interval_secs = interval.parse()?;
    }
    config.validate()?;
    Ok(config)
}

async fn cmd_start_node(config: NodeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let (mut server, network) = Server::new(
        Some(&config.listen_addr),
        &config.bootstrap,
        config.request_timeout(),
        config.peer_sync_interval(),
    )?;
    let node = Arc::new(Node::new(config.clone(), Arc::new(network)));

    if !config.bootstrap.is_empty() {
        match time::timeout(config.request_timeout(), server.wait_for_peer(&node)).await {
            Ok(peer) => info!("connected to {peer}"),
            Err(_) => warn!("no bootstrap peer answered, starting alone"),
        }
    }
    tokio::spawn(server.run(node.clone()));
    tokio::spawn(node.clone().run());
    info!(
        "node started, rewards go to {} at difficulty {}",
        node.address(),
        config.difficulty
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}

fn cmd_create_keys() {
    let keys = KeyPair::generate();
    println!("private key: {}", keys.private_key_hex());
    println!("public key: {}", keys.public_key().to_hex());
}

async fn query(node: &str, request: Request) -> Result<Response, Box<dyn std::error::Error>> {
    let timeout = Duration::from_millis(CLIENT_TIMEOUT_MS);
    let sync_interval = Duration::from_secs(BLOCKCHAIN_NEIGHBOR_SYNC_TIME_SEC);
    let (network, peer) = server::connect(node, timeout, sync_interval).await?;
    let response = network::call(&network, peer, request, timeout).await?;
    Ok(response)
}

async fn cmd_send(
    node: &str,
    from: &str,
    to: &str,
    amount: f64,
    private_key: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let keys = KeyPair::from_private_hex(private_key)?;
    let request = TransactionRequest::signed(&keys, from, to, amount);
    match query(node, Request::CreateTransaction(request)).await? {
        Response::Success => println!("success"),
        Response::Rejected(reason) => println!("fail: {reason}"),
        other => return Err(format!("unexpected response {other:?}").into()),
    }
    Ok(())
}

async fn cmd_get_balance(node: &str, address: &str) -> Result<(), Box<dyn std::error::Error>> {
    match query(node, Request::WalletBalance { address: address.to_string() }).await? {
        Response::Balance(balance) => println!("Balance of {address}: {balance}"),
        other => return Err(format!("unexpected response {other:?}").into()),
    }
    Ok(())
}

async fn cmd_print_chain(node: &str) -> Result<(), Box<dyn std::error::Error>> {
    match query(node, Request::GetBlockChain).await? {
        Response::BlockChain(blocks) => print_blocks(&blocks)?,
        other => return Err(format!("unexpected response {other:?}").into()),
    }
    Ok(())
}

fn print_blocks(blocks: &[Block]) -> Result<(), Box<dyn std::error::Error>> {
    for block in blocks {
        println!("{}", serde_json::to_string_pretty(block)?);
    }
    Ok(())
}

async fn cmd_list_transactions(node: &str) -> Result<(), Box<dyn std::error::Error>> {
    match query(node, Request::ListTransactions).await? {
        Response::Transactions { transactions, length } => {
            println!("{length} pending transactions");
            println!("{}", serde_json::to_string_pretty(&transactions)?);
        }
        other => return Err(format!("unexpected response {other:?}").into()),
    }
    Ok(())
}
