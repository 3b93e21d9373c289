use std::time::Duration;

use log::{debug, info, warn};

use crate::block::Block;
use crate::blockchain::Blockchain;
use crate::message::{Request, Response};
use crate::network::{spawn_requests, Network};

/// Tracks the best chain seen so far while peers answer.
///
/// A candidate only counts if it is strictly longer than the local chain and
/// fully valid. Between valid candidates the longer one wins; on equal length
/// the one whose tip hash sorts first wins, so every node settles on the same
/// chain whatever order the answers arrive in.
#[derive(Debug)]
pub struct ChainSelector {
    local_len: usize,
    difficulty: usize,
    best: Option<Vec<Block>>,
}

impl ChainSelector {
    pub fn new(local_len: usize, difficulty: usize) -> ChainSelector {
        ChainSelector {
            local_len,
            difficulty,
            best: None,
        }
    }

    /// Returns true if `candidate` became the best chain.
    pub fn offer(&mut self, candidate: Vec<Block>) -> bool {
        if !self.outranks(&candidate) {
            return false;
        }
        if !Blockchain::is_valid_chain(&candidate, self.difficulty) {
            warn!("consensus: ignoring invalid chain of length {}", candidate.len());
            return false;
        }
        self.best = Some(candidate);
        true
    }

    fn outranks(&self, candidate: &[Block]) -> bool {
        let tip = match candidate.last() {
            Some(tip) => tip,
            None => return false,
        };
        match &self.best {
            None => candidate.len() > self.local_len,
            Some(best) if candidate.len() != best.len() => candidate.len() > best.len(),
            Some(best) => match best.last() {
                Some(best_tip) => tip.get_hash() < best_tip.get_hash(),
                None => true,
            },
        }
    }

    pub fn best_len(&self) -> Option<usize> {
        self.best.as_ref().map(Vec::len)
    }

    pub fn into_best(self) -> Option<Vec<Block>> {
        self.best
    }
}

/// Asks every peer for its chain and returns the best valid one that is
/// longer than `local_len`. Answers are consumed one at a time as they
/// arrive; a failed or timed-out peer is skipped.
pub async fn longest_valid_chain(
    network: &dyn Network,
    local_len: usize,
    difficulty: usize,
    timeout: Duration,
) -> Option<Vec<Block>> {
    let mut set = spawn_requests(network, &Request::GetBlockChain, timeout);
    let mut selector = ChainSelector::new(local_len, difficulty);

    while let Some(joined) = set.join_next().await {
        let (peer, result) = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("consensus: peer task aborted: {}", e);
                continue;
            }
        };
        match result {
            Ok(Response::BlockChain(chain)) => {
                let len = chain.len();
                if selector.offer(chain) {
                    debug!("consensus: {} offers the best chain so far ({} blocks)", peer, len);
                }
            }
            Ok(other) => warn!("consensus: {} answered {:?}", peer, other),
            Err(e) => warn!("consensus: skipping {}: {}", peer, e),
        }
    }

    if let Some(len) = selector.best_len() {
        info!("consensus: found a valid chain of {} blocks", len);
    }
    selector.into_best()
}
