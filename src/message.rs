use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::transaction::{Transaction, TransactionRequest};

/// Operations a node serves to wallets and to its peers.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum Request {
    /// Admit a transfer and relay it to peers.
    CreateTransaction(TransactionRequest),
    /// Admit a transfer relayed by a peer. Never relayed further.
    UpdateTransaction(TransactionRequest),
    ListTransactions,
    DeleteTransactions,
    Consensus,
    GetBlockChain,
    WalletBalance { address: String },
}

impl Request {
    pub fn kind(&self) -> &'static str {
        match self {
            Request::CreateTransaction(_) => "create-transaction",
            Request::UpdateTransaction(_) => "update-transaction",
            Request::ListTransactions => "list-transactions",
            Request::DeleteTransactions => "delete-transactions",
            Request::Consensus => "consensus",
            Request::GetBlockChain => "get-blockchain",
            Request::WalletBalance { .. } => "wallet-balance",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum Response {
    Success,
    Rejected(String),
    Transactions {
        transactions: Vec<Transaction>,
        length: usize,
    },
    Consensus {
        replaced: bool,
    },
    BlockChain(Vec<Block>),
    Balance(f64),
}
