//! The seam between the ledger and whatever carries requests to peers.
//!
//! `Network` sends one request to one peer; the helpers here fan a request
//! out to every peer with a per-call timeout and collect every outcome.

use std::time::Duration;

use futures::future::BoxFuture;
use libp2p::PeerId;
use log::{debug, error, warn};
use tokio::task::JoinSet;

use crate::error::{NetworkError, NetworkResult};
use crate::message::{Request, Response};

pub trait Network: Send + Sync {
    /// Peers currently known, never including the local node.
    fn peers(&self) -> Vec<PeerId>;

    fn request(&self, peer: PeerId, request: Request) -> BoxFuture<'static, NetworkResult<Response>>;
}

/// Serves inbound requests; implemented by the node.
pub trait RequestHandler: Send + Sync + 'static {
    fn handle(&self, request: Request) -> BoxFuture<'_, Response>;
}

pub type PeerOutcome = (PeerId, NetworkResult<Response>);

/// Outcome of a join-all fan-out: one entry per peer, whatever happened.
#[derive(Debug, Default)]
pub struct BroadcastReport {
    pub succeeded: Vec<(PeerId, Response)>,
    pub failed: Vec<(PeerId, NetworkError)>,
}

impl BroadcastReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Sends `request` to `peer`, turning an expired deadline into
/// `NetworkError::Timeout`.
pub async fn call(
    network: &dyn Network,
    peer: PeerId,
    request: Request,
    timeout: Duration,
) -> NetworkResult<Response> {
    with_timeout(peer, network.request(peer, request), timeout).await
}

async fn with_timeout(
    peer: PeerId,
    fut: BoxFuture<'static, NetworkResult<Response>>,
    timeout: Duration,
) -> NetworkResult<Response> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(NetworkError::Timeout {
            peer: peer.to_string(),
            millis: timeout.as_millis() as u64,
        }),
    }
}

/// Starts one task per known peer. Each task ends in a success, an error or a
/// timeout, so draining the set always terminates.
pub fn spawn_requests(
    network: &dyn Network,
    request: &Request,
    timeout: Duration,
) -> JoinSet<PeerOutcome> {
    let mut set = JoinSet::new();
    for peer in network.peers() {
        let fut = network.request(peer, request.clone());
        set.spawn(async move { (peer, with_timeout(peer, fut, timeout).await) });
    }
    set
}

/// Sends `request` to every peer and waits until every call is finished.
pub async fn broadcast(network: &dyn Network, request: Request, timeout: Duration) -> BroadcastReport {
    let kind = request.kind();
    let mut set = spawn_requests(network, &request, timeout);
    let mut report = BroadcastReport::default();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((peer, Ok(response))) => {
                debug!("{}: {} answered {:?}", kind, peer, response);
                report.succeeded.push((peer, response));
            }
            Ok((peer, Err(e))) => {
                warn!("{}: skipping {}: {}", kind, peer, e);
                report.failed.push((peer, e));
            }
            Err(e) => error!("{}: peer task aborted: {}", kind, e),
        }
    }
    report
}

/// Sends `request` to every peer and returns the first outcome. The other
/// calls keep running in the background and only have their result logged.
pub async fn relay_first(network: &dyn Network, request: Request, timeout: Duration) -> Option<PeerOutcome> {
    let kind = request.kind();
    let mut set = spawn_requests(network, &request, timeout);
    let first = loop {
        match set.join_next().await {
            Some(Ok(outcome)) => break Some(outcome),
            Some(Err(e)) => error!("{}: peer task aborted: {}", kind, e),
            None => break None,
        }
    };
    if !set.is_empty() {
        tokio::spawn(async move {
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((peer, Ok(_))) => debug!("{}: {} done", kind, peer),
                    Ok((peer, Err(e))) => warn!("{}: {} failed: {}", kind, peer, e),
                    Err(e) => error!("{}: peer task aborted: {}", kind, e),
                }
            }
        });
    }
    first
}
