use std::sync::Arc;

use futures::future::BoxFuture;
use log::{debug, error, info, warn};
use tokio::sync::{Mutex, RwLock};
use tokio::task;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::block::Block;
use crate::blockchain::Blockchain;
use crate::config::{NodeConfig, MINING_SENDER};
use crate::consensus;
use crate::error::TransactionError;
use crate::hash::Hash;
use crate::message::{Request, Response};
use crate::network::{self, Network, RequestHandler};
use crate::pow;
use crate::transaction::{Transaction, TransactionRequest};
use crate::txpool::TransactionPool;

/// One ledger participant: its chain, its pending pool and its view of the
/// network.
///
/// The pool mutex doubles as the mining lock. It is held for a whole mining
/// cycle, so admission waits for mining to finish and two cycles never
/// overlap. The chain sits behind its own lock, so peers can read it while
/// this node is mining. When both are taken, the pool comes first.
pub struct Node {
    config: NodeConfig,
    pool: Mutex<TransactionPool>,
    chain: RwLock<Blockchain>,
    network: Arc<dyn Network>,
}

impl Node {
    pub fn new(config: NodeConfig, network: Arc<dyn Network>) -> Node {
        Node {
            config,
            pool: Mutex::new(TransactionPool::new()),
            chain: RwLock::new(Blockchain::new()),
            network,
        }
    }

    /// Address credited with this node's mining rewards.
    pub fn address(&self) -> &str {
        &self.config.miner_address
    }

    /// Admits a transfer from a wallet, then relays it to peers. Returns
    /// once the first peer has answered.
    pub async fn create_transaction(&self, request: &TransactionRequest) -> Result<(), TransactionError> {
        self.admit(request).await?;
        let relay = Request::UpdateTransaction(request.clone());
        match network::relay_first(self.network.as_ref(), relay, self.config.request_timeout()).await {
            Some((peer, Ok(response))) => debug!("create-transaction: {} answered {:?}", peer, response),
            Some((peer, Err(e))) => warn!("create-transaction: relay to {} failed: {}", peer, e),
            None => debug!("create-transaction: no peers to relay to"),
        }
        Ok(())
    }

    /// Admits a transfer relayed by a peer. Not relayed any further.
    pub async fn update_transaction(&self, request: &TransactionRequest) -> Result<(), TransactionError> {
        self.admit(request).await
    }

    async fn admit(&self, request: &TransactionRequest) -> Result<(), TransactionError> {
        let transfer = request.decode()?;
        let mut pool = self.pool.lock().await;
        let chain = self.chain.read().await;
        pool.admit(
            &chain,
            &transfer.sender,
            &transfer.recipient,
            transfer.value,
            Some(&transfer.public_key),
            Some(&transfer.signature),
        )?;
        info!(
            "txpool: admitted {} -> {} ({}), {} pending",
            transfer.sender,
            transfer.recipient,
            transfer.value,
            pool.len()
        );
        Ok(())
    }

    pub async fn list_transactions(&self) -> (Vec<Transaction>, usize) {
        let pool = self.pool.lock().await;
        (pool.snapshot(), pool.len())
    }

    pub async fn delete_transactions(&self) {
        let mut pool = self.pool.lock().await;
        if pool.is_empty() {
            return;
        }
        debug!("txpool: clearing {} pending transactions", pool.len());
        pool.clear();
    }

    pub async fn get_block_chain(&self) -> Vec<Block> {
        self.chain.read().await.blocks().to_vec()
    }

    pub async fn wallet_balance(&self, address: &str) -> f64 {
        self.chain.read().await.balance_of(address)
    }

    /// Replaces the local chain with the best valid peer chain if one is
    /// strictly longer. Returns whether the chain was replaced.
    pub async fn resolve_conflicts(&self) -> bool {
        let local_len = self.chain.read().await.len();
        let best = consensus::longest_valid_chain(
            self.network.as_ref(),
            local_len,
            self.config.difficulty,
            self.config.request_timeout(),
        )
        .await;
        let best = match best {
            Some(best) => best,
            None => {
                debug!("consensus: local chain of {} blocks kept", local_len);
                return false;
            }
        };

        let mut chain = self.chain.write().await;
        // the local chain may have grown while peers were answering
        if best.len() <= chain.len() {
            info!("consensus: local chain grew to {} blocks, kept", chain.len());
            return false;
        }
        let len = best.len();
        let replaced = chain.replace(best);
        if replaced {
            info!("consensus: replaced local chain, now {} blocks", len);
        }
        replaced
    }

    /// One mining cycle: reward, proof of work, append, then tell every peer
    /// to drop its pool and run consensus. Returns the appended block.
    pub async fn mine(&self) -> Option<Block> {
        let mut pool = self.pool.lock().await;
        {
            let chain = self.chain.read().await;
            pool.add_transaction(
                &chain,
                MINING_SENDER,
                &self.config.miner_address,
                self.config.mining_reward,
                None,
                None,
            );
        }
        let mut transactions = pool.snapshot();
        info!(
            "mine: mining {} transactions ({} bytes)",
            transactions.len(),
            pool.heap_size()
        );

        let block = loop {
            let (tip_index, tip_hash) = {
                let chain = self.chain.read().await;
                let tip = chain.last_block();
                (tip.index(), tip.get_hash())
            };
            let (nonce, batch) = self.proof_of_work(transactions, tip_hash).await?;

            let mut chain = self.chain.write().await;
            if chain.last_block().get_hash() != tip_hash {
                debug!("mine: tip moved during proof of work, searching again");
                transactions = batch;
                continue;
            }
            let block = Block::new(nonce, tip_index, tip_hash, batch);
            if let Err(e) = chain.append(block.clone()) {
                error!("mine: mined block does not fit the chain: {}", e);
                return None;
            }
            break block;
        };
        pool.clear();
        info!("mine: appended block {} ({})", block.index(), block.get_hash());

        let timeout = self.config.request_timeout();
        let report = network::broadcast(self.network.as_ref(), Request::DeleteTransactions, timeout).await;
        debug!(
            "mine: {}/{} peers cleared their pool",
            report.succeeded.len(),
            report.total()
        );
        let report = network::broadcast(self.network.as_ref(), Request::Consensus, timeout).await;
        debug!(
            "mine: {}/{} peers ran consensus",
            report.succeeded.len(),
            report.total()
        );
        Some(block)
    }

    async fn proof_of_work(
        &self,
        transactions: Vec<Transaction>,
        previous_hash: Hash,
    ) -> Option<(u64, Vec<Transaction>)> {
        let difficulty = self.config.difficulty;
        let found = task::spawn_blocking(move || {
            let nonce = pow::search(&transactions, &previous_hash, difficulty);
            (nonce, transactions)
        })
        .await;
        match found {
            Ok(found) => Some(found),
            Err(e) => {
                error!("mine: proof of work task failed: {}", e);
                None
            }
        }
    }

    /// Background jobs: one consensus round at start, then a mining cycle on
    /// every tick of the mining timer.
    pub async fn run(self: Arc<Self>) {
        if self.resolve_conflicts().await {
            info!("node: adopted a peer chain at start");
        }
        let period = match self.config.mining_interval() {
            Some(period) => period,
            None => {
                info!("node: mining timer disabled");
                return;
            }
        };
        let mut timer = time::interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            timer.tick().await;
            self.mine().await;
        }
    }

    pub async fn handle_request(&self, request: Request) -> Response {
        debug!("request: {}", request.kind());
        match request {
            Request::CreateTransaction(request) => match self.create_transaction(&request).await {
                Ok(()) => Response::Success,
                Err(e) => Response::Rejected(e.to_string()),
            },
            Request::UpdateTransaction(request) => match self.update_transaction(&request).await {
                Ok(()) => Response::Success,
                Err(e) => Response::Rejected(e.to_string()),
            },
            Request::ListTransactions => {
                let (transactions, length) = self.list_transactions().await;
                Response::Transactions { transactions, length }
            }
            Request::DeleteTransactions => {
                self.delete_transactions().await;
                Response::Success
            }
            Request::Consensus => Response::Consensus {
                replaced: self.resolve_conflicts().await,
            },
            Request::GetBlockChain => Response::BlockChain(self.get_block_chain().await),
            Request::WalletBalance { address } => Response::Balance(self.wallet_balance(&address).await),
        }
    }
}

impl RequestHandler for Node {
    fn handle(&self, request: Request) -> BoxFuture<'_, Response> {
        Box::pin(self.handle_request(request))
    }
}

#[cfg(test)]
impl Node {
    pub(crate) async fn add_transaction(
        &self,
        sender: &str,
        recipient: &str,
        value: f64,
        public_key: Option<&crate::crypto::PublicKey>,
        signature: Option<&crate::crypto::Signature>,
    ) -> bool {
        let mut pool = self.pool.lock().await;
        let chain = self.chain.read().await;
        pool.add_transaction(&chain, sender, recipient, value, public_key, signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::error::{AdmissionError, RequestError};
    use crate::local_network::LocalHub;
    use crate::test_utils::mined_chain;

    /// Yields until a spawned `mine` holds the pool lock. On the test
    /// runtime's single thread that leaves it parked on its proof of work.
    async fn wait_until_mining(node: &Node) {
        while node.pool.try_lock().is_ok() {
            task::yield_now().await;
        }
    }

    const REWARD: f64 = 7.0;

    fn config(miner: &str) -> NodeConfig {
        NodeConfig {
            miner_address: miner.into(),
            difficulty: 1,
            mining_reward: REWARD,
            mining_interval_secs: 0,
            request_timeout_ms: 300,
            ..NodeConfig::default()
        }
    }

    #[tokio::test]
    async fn mining_sender_transfers_are_mined_with_the_reward() {
        let hub = LocalHub::new();
        let (_, node) = hub.add_node(config("miner"));

        assert!(node.add_transaction(MINING_SENDER, "B", 2.0, None, None).await);
        assert!(node.add_transaction(MINING_SENDER, "F", 4.0, None, None).await);
        let block = node.mine().await.unwrap();

        assert_eq!(block.index(), 1);
        assert_eq!(block.get_transactions().len(), 3);
        assert_eq!(node.get_block_chain().await.len(), 2);
        assert_eq!(node.list_transactions().await.1, 0);
        assert_eq!(node.wallet_balance("miner").await, REWARD);
        assert_eq!(node.wallet_balance("B").await, 2.0);
        assert_eq!(node.wallet_balance("F").await, 4.0);
        assert!(Blockchain::is_valid_chain(&node.get_block_chain().await, 1));
    }

    #[tokio::test]
    async fn signed_transfer_is_admitted_and_mined() {
        let hub = LocalHub::new();
        let (_, node) = hub.add_node(config("alice"));
        let keys = KeyPair::generate();
        node.mine().await.unwrap();

        let request = TransactionRequest::signed(&keys, "alice", "bob", 3.0);
        node.create_transaction(&request).await.unwrap();
        let (pending, length) = node.list_transactions().await;
        assert_eq!(length, 1);
        assert_eq!(pending[0].recipient(), "bob");

        node.mine().await.unwrap();
        assert_eq!(node.wallet_balance("alice").await, 2.0 * REWARD - 3.0);
        assert_eq!(node.wallet_balance("bob").await, 3.0);
    }

    #[tokio::test]
    async fn rejected_requests_leave_the_pool_alone() {
        let hub = LocalHub::new();
        let (_, node) = hub.add_node(config("alice"));
        let keys = KeyPair::generate();

        let mut missing = TransactionRequest::signed(&keys, "alice", "bob", 3.0);
        missing.recipient.clear();
        assert_eq!(
            node.create_transaction(&missing).await,
            Err(TransactionError::Request(RequestError::MissingFields))
        );

        let unfunded = TransactionRequest::signed(&keys, "alice", "bob", 3.0);
        assert_eq!(
            node.create_transaction(&unfunded).await,
            Err(TransactionError::Admission(AdmissionError::InsufficientFunds {
                balance: 0.0,
                value: 3.0
            }))
        );

        let reward = TransactionRequest::signed(&keys, MINING_SENDER, "bob", 3.0);
        let response = node.handle_request(Request::CreateTransaction(reward)).await;
        assert!(matches!(response, Response::Rejected(_)));
        assert_eq!(node.list_transactions().await.1, 0);
    }

    #[tokio::test]
    async fn mining_propagates_the_chain_and_clears_peer_pools() {
        let hub = LocalHub::new();
        let (_, a) = hub.add_node(config("a"));
        let (_, b) = hub.add_node(config("b"));
        let (_, c) = hub.add_node(config("c"));
        assert!(b.add_transaction(MINING_SENDER, "x", 1.0, None, None).await);

        let block = a.mine().await.unwrap();

        for peer in [&b, &c] {
            let chain = peer.get_block_chain().await;
            assert_eq!(chain.len(), 2);
            assert_eq!(chain[1].get_hash(), block.get_hash());
            assert_eq!(peer.list_transactions().await.1, 0);
            assert_eq!(peer.wallet_balance("a").await, REWARD);
        }
    }

    #[tokio::test]
    async fn created_transaction_reaches_the_peer_pool() {
        let hub = LocalHub::new();
        let (_, a) = hub.add_node(config("alice"));
        let (_, b) = hub.add_node(config("b"));
        let keys = KeyPair::generate();
        a.mine().await.unwrap();
        assert_eq!(b.wallet_balance("alice").await, REWARD);

        let request = TransactionRequest::signed(&keys, "alice", "bob", 1.5);
        let response = a.handle_request(Request::CreateTransaction(request)).await;
        assert!(matches!(response, Response::Success));

        let (pending, length) = b.list_transactions().await;
        assert_eq!(length, 1);
        assert_eq!(pending[0].sender(), "alice");
        assert_eq!(a.list_transactions().await.1, 1);
    }

    #[tokio::test]
    async fn unresponsive_peers_do_not_stall_mining() {
        let hub = LocalHub::new();
        let (_, node) = hub.add_node(config("miner"));
        hub.add_silent();
        hub.add_failing();

        let mined = time::timeout(std::time::Duration::from_secs(5), node.mine()).await;
        assert!(mined.unwrap().is_some());
        assert_eq!(node.get_block_chain().await.len(), 2);
    }

    #[tokio::test]
    async fn consensus_keeps_a_longer_local_chain() {
        let hub = LocalHub::new();
        let (_, a) = hub.add_node(config("a"));
        let (_, b) = hub.add_node(config("b"));
        a.mine().await.unwrap();
        a.mine().await.unwrap();
        assert_eq!(b.get_block_chain().await.len(), 3);

        let response = a.handle_request(Request::Consensus).await;
        assert!(matches!(response, Response::Consensus { replaced: false }));
        assert_eq!(a.get_block_chain().await.len(), 3);
    }

    #[tokio::test]
    async fn mining_restarts_when_the_tip_moves() {
        let hub = LocalHub::new();
        let (_, node) = hub.add_node(config("miner"));
        let longer = mined_chain(3, 1);

        let miner = node.clone();
        let mining = tokio::spawn(async move { miner.mine().await });
        wait_until_mining(&node).await;
        assert!(node.chain.write().await.replace(longer.clone()));

        let block = mining.await.unwrap().unwrap();
        assert_eq!(block.index(), 3);
        assert_eq!(block.get_prev_hash(), longer[2].get_hash());
        let chain = node.get_block_chain().await;
        assert_eq!(chain.len(), 4);
        assert_eq!(chain[3], block);
        assert!(Blockchain::is_valid_chain(&chain, 1));
    }

    #[tokio::test]
    async fn transfer_submitted_during_mining_waits_for_the_next_block() {
        let hub = LocalHub::new();
        let (_, node) = hub.add_node(config("alice"));
        let keys = KeyPair::generate();
        node.mine().await.unwrap();

        let miner = node.clone();
        let mining = tokio::spawn(async move { miner.mine().await });
        wait_until_mining(&node).await;
        let request = TransactionRequest::signed(&keys, "alice", "bob", 2.0);
        node.create_transaction(&request).await.unwrap();

        let block = mining.await.unwrap().unwrap();
        assert_eq!(block.get_transactions().len(), 1);
        assert_eq!(block.get_transactions()[0].sender(), MINING_SENDER);
        let (pending, length) = node.list_transactions().await;
        assert_eq!(length, 1);
        assert_eq!(pending[0].recipient(), "bob");

        let next = node.mine().await.unwrap();
        assert!(next.get_transactions().iter().any(|tx| tx.recipient() == "bob"));
        assert_eq!(node.wallet_balance("bob").await, 2.0);
        assert_eq!(node.list_transactions().await.1, 0);
    }

    #[tokio::test]
    async fn serves_read_requests() {
        let hub = LocalHub::new();
        let (_, node) = hub.add_node(config("miner"));
        node.mine().await.unwrap();

        match node.handle_request(Request::WalletBalance { address: "miner".into() }).await {
            Response::Balance(balance) => assert_eq!(balance, REWARD),
            other => panic!("unexpected response {:?}", other),
        }
        match node.handle_request(Request::GetBlockChain).await {
            Response::BlockChain(blocks) => assert_eq!(blocks.len(), 2),
            other => panic!("unexpected response {:?}", other),
        }
        assert!(node.add_transaction(MINING_SENDER, "x", 1.0, None, None).await);
        match node.handle_request(Request::ListTransactions).await {
            Response::Transactions { length, .. } => assert_eq!(length, 1),
            other => panic!("unexpected response {:?}", other),
        }
        assert!(matches!(
            node.handle_request(Request::DeleteTransactions).await,
            Response::Success
        ));
        assert_eq!(node.list_transactions().await.1, 0);
    }
}
