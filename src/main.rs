mod behavior;
mod block;
mod blockchain;
mod cli;
mod config;
mod consensus;
mod crypto;
mod error;
mod hash;
mod message;
mod network;
mod node;
mod pow;
mod server;
mod transaction;
mod txpool;

#[cfg(test)]
mod local_network;
#[cfg(test)]
mod test_utils;

use crate::cli::Cli;
use env_logger::{Builder, Env};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    Builder::from_env(Env::default().default_filter_or("info")).init();
    let mut cli = Cli::new()?;
    cli.run().await
}
