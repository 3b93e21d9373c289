use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::StreamExt;
use libp2p::core::ConnectedPoint;
use libp2p::identify::{
    Behaviour as IdentifyBehavior, Config as IdentifyConfig, Event as IdentifyEvent,
};
use libp2p::request_response::cbor::Behaviour as RequestResponseBehavior;
use libp2p::request_response::{
    Config as RequestResponseConfig, Event as RequestResponseEvent,
    Message as RequestResponseMessage, OutboundRequestId,
    ProtocolSupport as RequestResponseProtocolSupport, ResponseChannel,
};
use libp2p::swarm::SwarmEvent;
use libp2p::{identity, noise, tcp, yamux, Multiaddr, PeerId, StreamProtocol, Swarm};
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};

use crate::behavior::Behavior;
use crate::behavior::Event as AgentEvent;
use crate::error::{NetworkError, NetworkResult};
use crate::message::{Request, Response};
use crate::network::{Network, RequestHandler};

const IDENTIFY_PROTOCOL: &str = "/zero-ledger/id/1.0.0";
const RPC_PROTOCOL: &str = "/zero-ledger/rpc/1.0.0";
const IDLE_CONNECTION_TIMEOUT_SEC: u64 = 60;

enum Command {
    Request {
        peer: PeerId,
        request: Request,
        reply: oneshot::Sender<NetworkResult<Response>>,
    },
    Respond {
        channel: ResponseChannel<Response>,
        response: Response,
    },
}

type PeerSet = Arc<RwLock<HashSet<PeerId>>>;

/// Handle the node uses to reach its peers. Cheap to clone; every call is
/// forwarded to the `Server` event loop.
#[derive(Clone)]
pub struct P2pNetwork {
    commands: mpsc::UnboundedSender<Command>,
    peers: PeerSet,
}

impl Network for P2pNetwork {
    fn peers(&self) -> Vec<PeerId> {
        let peers = self.peers.read().unwrap_or_else(PoisonError::into_inner);
        peers.iter().copied().collect()
    }

    fn request(&self, peer: PeerId, request: Request) -> BoxFuture<'static, NetworkResult<Response>> {
        let commands = self.commands.clone();
        Box::pin(async move {
            let (reply, response) = oneshot::channel();
            commands
                .send(Command::Request { peer, request, reply })
                .map_err(|_| NetworkError::Shutdown)?;
            response.await.map_err(|_| NetworkError::Shutdown)?
        })
    }
}

/// Owns the swarm. Peers join once they identify themselves and leave when
/// their last connection closes; bootstrap addresses are redialed on every
/// peer refresh.
pub struct Server {
    swarm: Swarm<Behavior>,
    commands: mpsc::UnboundedReceiver<Command>,
    command_sender: mpsc::UnboundedSender<Command>,
    pending: HashMap<OutboundRequestId, oneshot::Sender<NetworkResult<Response>>>,
    peers: PeerSet,
    bootstrap: Vec<Multiaddr>,
    bootstrap_peers: HashMap<Multiaddr, PeerId>,
    sync_interval: Duration,
}

impl Server {
    /// Builds the swarm, starts listening on `listen_addr` if given and
    /// dials every bootstrap address.
    pub fn new(
        listen_addr: Option<&str>,
        bootstrap: &[String],
        request_timeout: Duration,
        sync_interval: Duration,
    ) -> Result<(Server, P2pNetwork), Box<dyn std::error::Error>> {
        let local_key = identity::Keypair::generate_ed25519();
        let mut swarm = libp2p::SwarmBuilder::with_existing_identity(local_key)
            .with_tokio()
            .with_tcp(
                tcp::Config::default(),
                noise::Config::new,
                yamux::Config::default,
            )?
            .with_behaviour(|key| {
                let local_peer_id = PeerId::from(key.public());
                info!("Local peer ID : {local_peer_id}");
                let identify_config =
                    IdentifyConfig::new(IDENTIFY_PROTOCOL.to_string(), key.public())
                        .with_push_listen_addr_updates(true)
                        .with_interval(sync_interval);

                let rr_config = RequestResponseConfig::default().with_request_timeout(request_timeout);
                let rr_protocol = StreamProtocol::new(RPC_PROTOCOL);
                let rr_behavior = RequestResponseBehavior::<Request, Response>::new(
                    [(rr_protocol, RequestResponseProtocolSupport::Full)],
                    rr_config,
                );
                Behavior::new(IdentifyBehavior::new(identify_config), rr_behavior)
            })?
            .with_swarm_config(|cfg| {
                cfg.with_idle_connection_timeout(Duration::from_secs(IDLE_CONNECTION_TIMEOUT_SEC))
            })
            .build();

        if let Some(addr) = listen_addr {
            swarm.listen_on(addr.parse()?)?;
        }
        let bootstrap = bootstrap
            .iter()
            .map(|addr| addr.parse::<Multiaddr>())
            .collect::<Result<Vec<_>, _>>()?;
        for addr in &bootstrap {
            match swarm.dial(addr.clone()) {
                Ok(()) => info!("dialed {addr}"),
                Err(e) => warn!("failed to dial {addr}: {e}"),
            }
        }

        let (command_sender, commands) = mpsc::unbounded_channel();
        let peers = PeerSet::default();
        let network = P2pNetwork {
            commands: command_sender.clone(),
            peers: peers.clone(),
        };
        let server = Server {
            swarm,
            commands,
            command_sender,
            pending: HashMap::new(),
            peers,
            bootstrap,
            bootstrap_peers: HashMap::new(),
            sync_interval,
        };
        Ok((server, network))
    }

    /// Drives the swarm until some peer has identified itself.
    pub async fn wait_for_peer<H: RequestHandler>(&mut self, handler: &Arc<H>) -> PeerId {
        loop {
            let event = self.swarm.select_next_some().await;
            self.handle_event(event, handler);
            if let Some(peer) = self.known_peers().into_iter().next() {
                return peer;
            }
        }
    }

    pub async fn run<H: RequestHandler>(mut self, handler: Arc<H>) {
        let mut refresh = time::interval_at(Instant::now() + self.sync_interval, self.sync_interval);
        loop {
            tokio::select! {
                event = self.swarm.select_next_some() => self.handle_event(event, &handler),
                Some(command) = self.commands.recv() => self.handle_command(command),
                _ = refresh.tick() => self.refresh_peers(),
            }
        }
    }

    fn known_peers(&self) -> Vec<PeerId> {
        let peers = self.peers.read().unwrap_or_else(PoisonError::into_inner);
        peers.iter().copied().collect()
    }

    fn add_peer(&self, peer_id: PeerId) -> bool {
        let mut peers = self.peers.write().unwrap_or_else(PoisonError::into_inner);
        peers.insert(peer_id)
    }

    fn remove_peer(&self, peer_id: &PeerId) -> bool {
        let mut peers = self.peers.write().unwrap_or_else(PoisonError::into_inner);
        peers.remove(peer_id)
    }

    fn refresh_peers(&mut self) {
        for addr in &self.bootstrap {
            let connected = self
                .bootstrap_peers
                .get(addr)
                .map_or(false, |peer| self.swarm.is_connected(peer));
            if connected {
                continue;
            }
            match self.swarm.dial(addr.clone()) {
                Ok(()) => debug!("refresh: redialed {addr}"),
                Err(e) => warn!("refresh: failed to dial {addr}: {e}"),
            }
        }
        debug!("refresh: {} known peers", self.known_peers().len());
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Request { peer, request, reply } => {
                if peer == *self.swarm.local_peer_id() {
                    let _ = reply.send(Err(NetworkError::PeerNotFound(peer.to_string())));
                    return;
                }
                let request_id = self.swarm.behaviour_mut().send_message(&peer, request);
                debug!("RequestID: {request_id} -> {peer}");
                self.pending.insert(request_id, reply);
            }
            Command::Respond { channel, response } => {
                if self.swarm.behaviour_mut().send_response(channel, response).is_err() {
                    warn!("response dropped: requester is gone");
                }
            }
        }
    }

    fn handle_event<H: RequestHandler>(&mut self, event: SwarmEvent<AgentEvent>, handler: &Arc<H>) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => info!("NewListenAddr: {address}"),
            SwarmEvent::ConnectionEstablished { peer_id, endpoint, .. } => {
                debug!("ConnectionEstablished: {peer_id} | {endpoint:?}");
                if let ConnectedPoint::Dialer { address, .. } = endpoint {
                    if self.bootstrap.contains(&address) {
                        self.bootstrap_peers.insert(address, peer_id);
                    }
                }
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                num_established,
                cause,
                ..
            } => {
                if num_established == 0 && self.remove_peer(&peer_id) {
                    info!("peer {peer_id} left ({cause:?})");
                }
            }
            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                warn!("OutgoingConnectionError: {peer_id:?} | {error}")
            }
            SwarmEvent::IncomingConnectionError { send_back_addr, error, .. } => {
                warn!("IncomingConnectionError: {send_back_addr} | {error}")
            }
            SwarmEvent::Behaviour(AgentEvent::Identify(event)) => match event {
                IdentifyEvent::Received { peer_id, info, .. } => {
                    for addr in info.listen_addrs {
                        self.swarm.add_peer_address(peer_id, addr);
                    }
                    if self.add_peer(peer_id) {
                        info!("peer {peer_id} joined, {} known", self.known_peers().len());
                    }
                }
                IdentifyEvent::Error { peer_id, error, .. } => {
                    warn!("IdentifyEvent:Error: {peer_id} | {error}")
                }
                _ => {}
            },
            SwarmEvent::Behaviour(AgentEvent::RequestResponse(event)) => {
                self.handle_request_response(event, handler)
            }
            _ => {}
        }
    }

    fn handle_request_response<H: RequestHandler>(
        &mut self,
        event: RequestResponseEvent<Request, Response>,
        handler: &Arc<H>,
    ) {
        match event {
            RequestResponseEvent::Message { peer, message, .. } => match message {
                RequestResponseMessage::Request { request, channel, .. } => {
                    debug!("inbound {} from {peer}", request.kind());
                    let handler = handler.clone();
                    let commands = self.command_sender.clone();
                    tokio::spawn(async move {
                        let response = handler.handle(request).await;
                        if commands.send(Command::Respond { channel, response }).is_err() {
                            error!("event loop stopped before the response to {peer} was sent");
                        }
                    });
                }
                RequestResponseMessage::Response { request_id, response } => {
                    if let Some(reply) = self.pending.remove(&request_id) {
                        let _ = reply.send(Ok(response));
                    }
                }
            },
            RequestResponseEvent::OutboundFailure {
                peer,
                request_id,
                error,
                ..
            } => {
                if let Some(reply) = self.pending.remove(&request_id) {
                    let _ = reply.send(Err(NetworkError::RequestFailed {
                        peer: peer.to_string(),
                        reason: error.to_string(),
                    }));
                }
            }
            RequestResponseEvent::InboundFailure { peer, error, .. } => {
                warn!("inbound request from {peer} failed: {error}")
            }
            RequestResponseEvent::ResponseSent { .. } => {}
        }
    }
}

/// Inbound side of a short-lived wallet connection. A wallet holds no
/// ledger, so it turns down whatever the node asks of it.
struct WalletClient;

impl RequestHandler for WalletClient {
    fn handle(&self, request: Request) -> BoxFuture<'_, Response> {
        Box::pin(async move {
            Response::Rejected(format!("wallet client cannot serve {}", request.kind()))
        })
    }
}

/// Connects to the node at `node_addr` without listening, for one-shot
/// wallet commands.
pub async fn connect(
    node_addr: &str,
    timeout: Duration,
    sync_interval: Duration,
) -> Result<(P2pNetwork, PeerId), Box<dyn std::error::Error>> {
    let (mut server, network) = Server::new(None, &[node_addr.to_string()], timeout, sync_interval)?;
    let handler = Arc::new(WalletClient);
    let peer = time::timeout(timeout, server.wait_for_peer(&handler))
        .await
        .map_err(|_| format!("could not reach a node at {node_addr}"))?;
    tokio::spawn(server.run(handler));
    Ok((network, peer))
}
