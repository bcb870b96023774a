use crate::actor::WeakActorClient;
use crate::replica::election::{ElectionState, ElectionStateChangeListener, ElectionTimer};
use crate::replica::heartbeat::HeartbeatPolicy;
use crate::replica::peer_client::PeerTransport;
use crate::replica::peers::{self, Membership, ServerId};
use crate::replica::replica::{Replica, RpcTimeouts};
use std::sync::Arc;
use std::time::Duration;

pub(crate) struct ReplicaSettings {
    pub(crate) my_server_id: ServerId,
    pub(crate) my_address: String,
    pub(crate) seed_peers: Vec<String>,
    pub(crate) election_min_timeout: Duration,
    pub(crate) election_max_timeout: Duration,
    pub(crate) heartbeat_policy: HeartbeatPolicy,
    pub(crate) timeouts: RpcTimeouts,
}

pub(crate) fn create_replica(
    logger: slog::Logger,
    settings: ReplicaSettings,
    transport: Arc<dyn PeerTransport>,
    actor_client: WeakActorClient,
) -> (Replica, ElectionStateChangeListener) {
    let seeds = peers::parse_seed_peers(&settings.seed_peers, &settings.my_address);
    let membership = Membership::new(settings.my_server_id.clone(), settings.my_address, seeds);

    let (election_state, election_state_change_listener) = ElectionState::new_follower(settings.my_server_id);
    let election_timer = ElectionTimer::new(
        settings.election_min_timeout,
        settings.election_max_timeout,
        actor_client.clone(),
    );

    let replica = Replica::new(
        logger,
        membership,
        election_state,
        election_timer,
        transport,
        actor_client,
        settings.timeouts,
        settings.heartbeat_policy,
    );

    (replica, election_state_change_listener)
}
