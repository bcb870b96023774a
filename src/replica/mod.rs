mod election;
mod heartbeat;
mod join;
mod local_state;
mod peer_client;
mod peers;
mod replica;
mod replica_api;
mod replica_wiring;
mod replication;

pub(crate) use election::ElectionStateChangeListener;
pub(crate) use election::ElectionStateSnapshot;
pub(crate) use election::{stop_signal, Stopper};
pub(crate) use heartbeat::probe_leader;
pub(crate) use heartbeat::HeartbeatLoop;
pub(crate) use heartbeat::HeartbeatPolicy;
pub(crate) use join::join_network;
pub(crate) use local_state::Term;
pub(crate) use peer_client::GrpcPeerTransport;
pub(crate) use peer_client::PeerTransport;
pub(crate) use peer_client::{non_empty_server_id, server_info_from_proto, server_info_to_proto};
pub(crate) use peers::PeerTarget;
pub(crate) use peers::ServerId;
#[cfg(test)]
pub(crate) use peers::ServerInfo;
pub use peers::ServerRole;
pub use replica_api::ClusterView;
pub use replica_api::OperationRecord;
pub use replica_api::ReplicationOutcome;
pub(crate) use replica_api::{
    FanOutPlan, HeartbeatMessage, HeartbeatPlan, HeartbeatReply, HeartbeatRound, JoinReply, JoinRequest,
    LeaderProbe, LeaderProbeResult, NetworkState, OperationRequest, ReplicateInput, ReplicateInputError,
    ReplicateOperationOutput, VoteReplyFromPeer,
};
pub(crate) use replica::Replica;
pub(crate) use replica::RpcTimeouts;
pub(crate) use replica_wiring::create_replica;
pub(crate) use replica_wiring::ReplicaSettings;
pub(crate) use replication::fan_out;

#[cfg(test)]
pub(crate) use replica::test_support;
