use crate::actor::{ActorClient, ReplicaActor};
use crate::api::event_bus::ElectionEventListener;
use crate::api::node::ReplicaNode;
use crate::api::options::ReplicaOptionsValidated;
use crate::api::{OperationApplier, ReplicaOptions};
use crate::replica::{self, GrpcPeerTransport, HeartbeatPolicy, PeerTransport, ReplicaSettings, RpcTimeouts, ServerId};
use crate::server::{self, RpcServer};
use std::convert::TryFrom;
use std::net::SocketAddr;
use std::sync::Arc;

pub struct ReplicaConfig {
    pub server_id: String,
    /// Address this replica listens on and advertises to peers, e.g. `127.0.0.1:5001`.
    pub address: String,
    /// `id:address` entries, or bare addresses. Empty means this replica starts a new cluster.
    pub seed_peers: Vec<String>,
    pub logger: slog::Logger,
    pub options: ReplicaOptions,
    pub applier: Arc<dyn OperationApplier>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReplicaCreationError {
    #[error("Server ID must not be empty")]
    MissingServerId,
    #[error("Invalid listen address '{0}'")]
    InvalidAddress(String),
    #[error("Illegal options for configuring replica: {0}")]
    IllegalOptions(String),
}

/// Build a replica and start serving its RPCs. The replica doesn't take part in the cluster until
/// `ReplicaNode::start()` is called.
pub async fn try_create_replica_node(config: ReplicaConfig) -> Result<ReplicaNode, ReplicaCreationError> {
    if config.server_id.is_empty() {
        return Err(ReplicaCreationError::MissingServerId);
    }
    let socket_addr: SocketAddr = config
        .address
        .parse()
        .map_err(|_| ReplicaCreationError::InvalidAddress(config.address.clone()))?;
    let options = ReplicaOptionsValidated::try_from(config.options)
        .map_err(|e| ReplicaCreationError::IllegalOptions(e.to_string()))?;

    let logger = config.logger.new(slog::o!("ServerId" => config.server_id.clone()));

    let (actor_client, actor_queue_rx) = ActorClient::new(32);
    let (server_shutdown_handle, server_shutdown_signal) = server::shutdown_signal();
    let transport: Arc<dyn PeerTransport> = Arc::new(GrpcPeerTransport::new());

    let settings = ReplicaSettings {
        my_server_id: ServerId::new(config.server_id.clone()),
        my_address: config.address.clone(),
        seed_peers: config.seed_peers,
        election_min_timeout: options.election_min_timeout,
        election_max_timeout: options.election_max_timeout,
        heartbeat_policy: HeartbeatPolicy {
            interval: options.heartbeat_interval,
            max_missed: options.max_missed_heartbeats,
        },
        timeouts: RpcTimeouts {
            vote_request: options.vote_request_timeout,
            heartbeat: options.heartbeat_rpc_timeout,
        },
    };
    let (replica, election_state_change_listener) =
        replica::create_replica(logger.clone(), settings, transport.clone(), actor_client.weak());

    let replica_actor = ReplicaActor::new(logger.clone(), actor_queue_rx, replica);
    tokio::spawn(replica_actor.run_event_loop());

    let rpc_server = RpcServer::new(logger.clone(), actor_client.weak(), config.applier);
    tokio::spawn(rpc_server.run(socket_addr, server_shutdown_signal));

    Ok(ReplicaNode {
        logger,
        server_id: config.server_id,
        address: config.address,
        actor_client,
        transport,
        options,
        election_events: ElectionEventListener::new(election_state_change_listener),
        heartbeat_stopper: None,
        server_shutdown_handle: Some(server_shutdown_handle),
    })
}
