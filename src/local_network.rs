//! In-process stand-in for the libp2p transport, used by tests.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use futures::future::BoxFuture;
use libp2p::PeerId;

use crate::config::NodeConfig;
use crate::error::{NetworkError, NetworkResult};
use crate::message::{Request, Response};
use crate::network::Network;
use crate::node::Node;

#[derive(Clone)]
enum Endpoint {
    Node(Weak<Node>),
    /// Answers every request with the same response.
    Fixed(Response),
    /// Fails every request at once.
    Failing,
    /// Never answers.
    Silent,
}

/// Registry of every endpoint reachable in one test.
#[derive(Clone, Default)]
pub(crate) struct LocalHub {
    endpoints: Arc<RwLock<HashMap<PeerId, Endpoint>>>,
}

impl LocalHub {
    pub(crate) fn new() -> LocalHub {
        LocalHub::default()
    }

    /// A network handle for a caller that is not itself reachable.
    pub(crate) fn local_network(&self) -> LocalNetwork {
        LocalNetwork {
            me: PeerId::random(),
            hub: self.clone(),
        }
    }

    pub(crate) fn add_node(&self, config: NodeConfig) -> (PeerId, Arc<Node>) {
        let network = self.local_network();
        let me = network.me;
        let node = Arc::new(Node::new(config, Arc::new(network)));
        self.insert(me, Endpoint::Node(Arc::downgrade(&node)));
        (me, node)
    }

    pub(crate) fn add_fixed(&self, response: Response) -> PeerId {
        self.insert(PeerId::random(), Endpoint::Fixed(response))
    }

    pub(crate) fn add_failing(&self) -> PeerId {
        self.insert(PeerId::random(), Endpoint::Failing)
    }

    pub(crate) fn add_silent(&self) -> PeerId {
        self.insert(PeerId::random(), Endpoint::Silent)
    }

    fn insert(&self, peer: PeerId, endpoint: Endpoint) -> PeerId {
        self.endpoints.write().unwrap().insert(peer, endpoint);
        peer
    }

    fn endpoint(&self, peer: &PeerId) -> Option<Endpoint> {
        self.endpoints.read().unwrap().get(peer).cloned()
    }
}

pub(crate) struct LocalNetwork {
    me: PeerId,
    hub: LocalHub,
}

impl Network for LocalNetwork {
    fn peers(&self) -> Vec<PeerId> {
        let endpoints = self.hub.endpoints.read().unwrap();
        endpoints.keys().filter(|p| **p != self.me).copied().collect()
    }

    fn request(&self, peer: PeerId, request: Request) -> BoxFuture<'static, NetworkResult<Response>> {
        let endpoint = self.hub.endpoint(&peer);
        Box::pin(async move {
            match endpoint {
                Some(Endpoint::Node(node)) => match node.upgrade() {
                    Some(node) => Ok(node.handle_request(request).await),
                    None => Err(NetworkError::PeerNotFound(peer.to_string())),
                },
                Some(Endpoint::Fixed(response)) => Ok(response),
                Some(Endpoint::Failing) => Err(NetworkError::RequestFailed {
                    peer: peer.to_string(),
                    reason: "connection refused".into(),
                }),
                Some(Endpoint::Silent) => futures::future::pending().await,
                None => Err(NetworkError::PeerNotFound(peer.to_string())),
            }
        })
    }
}
