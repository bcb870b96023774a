use crate::replica::local_state::Term;
use crate::replica::peer_client::TransportError;
use crate::replica::peers::{PeerTarget, ServerId, ServerInfo, ServerRole};
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};

/// Heartbeat-shaped message. Leaders send it as a liveness broadcast, candidates as a vote
/// request, followers as a probe of their leader. `role` tells the receiver which one it is.
#[derive(Clone, Debug)]
pub(crate) struct HeartbeatMessage {
    pub(crate) server_id: ServerId,
    pub(crate) term: Term,
    pub(crate) role: ServerRole,
    pub(crate) timestamp_millis: i64,
    // Only leaders fill this in. Receivers merge members they've never heard of.
    pub(crate) servers: Vec<ServerInfo>,
}

#[derive(Clone, Debug)]
pub(crate) struct HeartbeatReply {
    pub(crate) term: Term,
    pub(crate) success: bool,
    pub(crate) role: Option<ServerRole>,
}

#[derive(Clone, Debug)]
pub(crate) struct JoinRequest {
    pub(crate) server_id: ServerId,
    pub(crate) address: String,
}

#[derive(Clone, Debug)]
pub(crate) struct JoinReply {
    pub(crate) success: bool,
    pub(crate) term: Term,
    pub(crate) leader_id: Option<ServerId>,
    pub(crate) servers: Vec<ServerInfo>,
    pub(crate) server_addresses: Vec<(ServerId, String)>,
}

impl JoinReply {
    pub(crate) fn refused(term: Term) -> Self {
        JoinReply {
            success: false,
            term,
            leader_id: None,
            servers: Vec::new(),
            server_addresses: Vec::new(),
        }
    }

    /// Address of the leader according to this reply, if the reply names one we can reach.
    pub(crate) fn leader_address(&self) -> Option<&str> {
        let leader_id = self.leader_id.as_ref()?;
        self.servers
            .iter()
            .find(|s| s.server_id == *leader_id)
            .map(|s| s.address.as_str())
            .or_else(|| {
                self.server_addresses
                    .iter()
                    .find(|(id, _)| id == leader_id)
                    .map(|(_, address)| address.as_str())
            })
    }
}

/// A write operation as it travels from leader to followers.
#[derive(Clone, Debug)]
pub(crate) struct OperationRequest {
    pub(crate) service_name: String,
    pub(crate) method_name: String,
    pub(crate) serialized_request: Bytes,
    pub(crate) operation_id: u64,
    pub(crate) server_id: ServerId,
    pub(crate) term: Term,
}

#[derive(Debug)]
pub(crate) struct ReplicateInput {
    pub(crate) service_name: String,
    pub(crate) method_name: String,
    pub(crate) serialized_request: Bytes,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ReplicateInputError {
    #[error("Leader {leader_id} is reachable but forwarding writes to it is not supported")]
    ForwardingUnavailable { leader_id: ServerId },
    #[error("Replica actor is dead RIP")]
    ActorExited,
}

/// Everything a fan-out task needs, computed by the actor while it is still leader.
#[derive(Debug)]
pub(crate) struct FanOutPlan {
    pub(crate) request: OperationRequest,
    pub(crate) targets: Vec<PeerTarget>,
}

/// What happened to one replicated write. Falling short of quorum is reported here, not as an
/// error.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReplicationOutcome {
    pub operation_id: u64,
    /// Acknowledgements, counting the leader itself.
    pub successes: usize,
    pub cluster_size: usize,
    pub quorum_reached: bool,
}

#[derive(Debug)]
pub(crate) struct ReplicateOperationOutput {
    pub(crate) accepted: bool,
}

#[derive(Clone, Debug)]
pub(crate) struct NetworkState {
    pub(crate) servers: Vec<ServerInfo>,
    pub(crate) leader_id: Option<ServerId>,
    pub(crate) term: Term,
}

#[derive(Debug)]
pub(crate) struct VoteReplyFromPeer {
    pub(crate) peer_id: ServerId,
    // The term we campaigned in.
    pub(crate) term: Term,
    pub(crate) result: Result<HeartbeatReply, TransportError>,
}

/// What the heartbeat loop should do this cycle.
#[derive(Debug)]
pub(crate) enum HeartbeatPlan {
    Idle,
    Broadcast {
        message: HeartbeatMessage,
        targets: Vec<PeerTarget>,
    },
    ProbeLeader(LeaderProbe),
}

#[derive(Clone, Debug)]
pub(crate) struct LeaderProbe {
    pub(crate) leader: PeerTarget,
    pub(crate) message: HeartbeatMessage,
}

#[derive(Debug)]
pub(crate) struct HeartbeatRound {
    pub(crate) term: Term,
    pub(crate) replies: Vec<(PeerTarget, Result<HeartbeatReply, TransportError>)>,
}

#[derive(Debug)]
pub(crate) struct LeaderProbeResult {
    pub(crate) leader_id: ServerId,
    pub(crate) term: Term,
    pub(crate) result: Result<HeartbeatReply, TransportError>,
    // On-demand checks start an election right away when the probe fails.
    pub(crate) elect_on_failure: bool,
}

/// One write in a replica's operation log, as the leader assigned it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OperationRecord {
    pub service_name: String,
    pub method_name: String,
    pub params: Bytes,
    /// Set once the service layer reports what applying the operation produced.
    pub result: Option<Bytes>,
    pub operation_id: u64,
    pub term: u64,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClusterView {
    pub server_id: String,
    pub address: String,
    pub term: u64,
    pub role: ServerRole,
    pub leader_id: Option<String>,
    /// Peer server id to address. Never contains this replica.
    pub peers: BTreeMap<String, String>,
    pub down_peers: BTreeSet<String>,
    pub operation_count: usize,
    pub last_operation_id: u64,
}
