use crate::actor::WeakActorClient;
use crate::replica::election::{CurrentLeader, ElectionState, ElectionTimer};
use crate::replica::heartbeat::{self, HeartbeatPolicy, PeerHealthTracker};
use crate::replica::local_state::{Term, TermState};
use crate::replica::peer_client::PeerTransport;
use crate::replica::peers::{Membership, PeerTarget, ServerId, ServerInfo, ServerRole};
use crate::replica::replica_api::{ClusterView, HeartbeatMessage, HeartbeatReply, NetworkState, VoteReplyFromPeer};
use crate::replica::replication::OperationLog;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::{Duration, Instant};

/// Deadlines for the RPCs the replica sends on its own. Join and replication calls are made by
/// `ReplicaNode`, which reads their deadlines from the options directly.
#[derive(Copy, Clone, Debug)]
pub(crate) struct RpcTimeouts {
    pub(crate) vote_request: Duration,
    pub(crate) heartbeat: Duration,
}

/// Replica owns all coordination state of one server. It is only ever touched from the actor, so
/// no method here awaits. Network calls are spawned and come back as actor events.
pub(crate) struct Replica {
    pub(super) logger: slog::Logger,
    pub(super) term_state: TermState,
    pub(super) election_state: ElectionState,
    pub(super) election_timer: ElectionTimer,
    pub(super) membership: Membership,
    // Soft "probably down" marks. Down peers stay in the peer table but don't count toward the
    // majority needed to win an election.
    pub(super) down_peers: HashSet<ServerId>,
    pub(super) peer_health: PeerHealthTracker,
    pub(super) operation_log: OperationLog,
    pub(super) transport: Arc<dyn PeerTransport>,
    pub(super) actor_client: WeakActorClient,
    pub(super) timeouts: RpcTimeouts,
    pub(super) heartbeat_policy: HeartbeatPolicy,
    pub(super) is_running: bool,
}

impl Replica {
    pub(crate) fn new(
        logger: slog::Logger,
        membership: Membership,
        election_state: ElectionState,
        election_timer: ElectionTimer,
        transport: Arc<dyn PeerTransport>,
        actor_client: WeakActorClient,
        timeouts: RpcTimeouts,
        heartbeat_policy: HeartbeatPolicy,
    ) -> Self {
        Replica {
            logger,
            term_state: TermState::new(membership.my_id().clone()),
            election_state,
            election_timer,
            membership,
            down_peers: HashSet::new(),
            peer_health: PeerHealthTracker::default(),
            operation_log: OperationLog::default(),
            transport,
            actor_client,
            timeouts,
            heartbeat_policy,
            is_running: false,
        }
    }

    // ------- Lifecycle --------

    pub(crate) fn handle_start(&mut self) -> Vec<PeerTarget> {
        self.is_running = true;
        self.election_timer.reset();
        slog::info!(
            self.logger,
            "Replica started at {} with {} seed(s)",
            self.membership.my_address(),
            self.membership.seed_peers().len()
        );

        self.membership.seed_peers().to_vec()
    }

    pub(crate) fn handle_shutdown(&mut self) {
        self.is_running = false;
        self.election_timer.cancel();
        slog::info!(self.logger, "Replica shut down. Election state: {:?}", self.election_state);
    }

    // ------- Election --------

    pub(crate) fn handle_election_timeout(&mut self, generation: u64) {
        if !self.election_timer.take_fired(generation) {
            slog::debug!(self.logger, "Ignoring stale election timeout (generation {})", generation);
            return;
        }
        if !self.is_running {
            return;
        }

        self.start_election();
    }

    pub(crate) fn start_election(&mut self) {
        if self.election_state.is_leader() {
            self.election_timer.reset();
            return;
        }

        let term = self.term_state.increment_term_and_vote_for_self();
        self.election_state.transition_to_candidate_and_vote_for_self(term);
        self.membership.set_my_role(ServerRole::Candidate);

        // Nobody else in the cluster: our own vote is the majority.
        if self.membership.peers().is_empty() {
            slog::info!(self.logger, "No peers. Winning election for term {:?} alone.", term);
            self.become_leader();
            return;
        }

        let mut targets = self.membership.active_targets(&self.down_peers);
        if targets.is_empty() {
            // Down marks only shrink the majority. They never count as votes.
            slog::info!(self.logger, "Every peer is marked down. Asking all of them again.");
            self.down_peers.clear();
            targets = self.membership.active_targets(&self.down_peers);
        }
        slog::info!(
            self.logger,
            "Starting election for term {:?}. Requesting votes from {} peer(s).",
            term,
            targets.len()
        );

        let message = self.heartbeat_message(ServerRole::Candidate, Vec::new());
        for target in targets {
            tokio::task::spawn(Self::call_peer_request_vote(
                self.logger.clone(),
                self.transport.clone(),
                target,
                message.clone(),
                self.timeouts.vote_request,
                self.actor_client.clone(),
                term,
            ));
        }

        self.election_timer.reset();
    }

    async fn call_peer_request_vote(
        logger: slog::Logger,
        transport: Arc<dyn PeerTransport>,
        target: PeerTarget,
        message: HeartbeatMessage,
        timeout: Duration,
        callback: WeakActorClient,
        term: Term,
    ) {
        slog::debug!(logger, "ClientWire - vote request to {} for term {:?}", target.id, term);
        let result = transport.heartbeat(&target.address, message, timeout).await;
        slog::debug!(logger, "ClientWire - vote reply from {}: {:?}", target.id, result);

        let _ = callback
            .vote_reply(VoteReplyFromPeer {
                peer_id: target.id,
                term,
                result,
            })
            .await;
    }

    pub(crate) fn handle_vote_reply(&mut self, reply: VoteReplyFromPeer) {
        let logger = self.logger.new(slog::o!("Peer" => reply.peer_id.to_string()));

        let peer_reply = match reply.result {
            Ok(peer_reply) => peer_reply,
            Err(e) if e.is_unavailable() => {
                slog::warn!(logger, "Peer unavailable during election, marking down: {}", e);
                self.down_peers.insert(reply.peer_id);
                return;
            }
            Err(e) => {
                slog::warn!(logger, "Vote request failed: {}", e);
                return;
            }
        };
        self.down_peers.remove(&reply.peer_id);

        if peer_reply.term > self.term_state.current_term() {
            self.step_down(peer_reply.term);
            return;
        }

        if !peer_reply.success || peer_reply.term != reply.term {
            slog::info!(logger, "Vote not granted for term {:?}", reply.term);
            return;
        }

        match self.election_state.add_vote_if_candidate(reply.term, reply.peer_id) {
            None => slog::info!(
                logger,
                "Received vote for term {:?} after moving on to: {:?}",
                reply.term,
                self.election_state
            ),
            Some(votes) => {
                let active = self.membership.active_peer_count(&self.down_peers);
                slog::info!(logger, "Received {}/{} votes for term {:?}", votes, active + 1, reply.term);
                if self.has_majority(votes) {
                    self.become_leader();
                }
            }
        }
    }

    /// Majority is computed over ourselves plus peers that are not marked down.
    pub(super) fn has_majority(&self, votes: usize) -> bool {
        let voters = self.membership.active_peer_count(&self.down_peers) + 1;
        2 * votes > voters
    }

    /// Idempotent. Also the self-promotion path for a follower that can't find a leader.
    pub(crate) fn become_leader(&mut self) {
        if self.election_state.is_leader() {
            return;
        }

        // Don't hand out a vote to anyone else for the term we lead.
        self.term_state
            .store_vote_for_term_if_unvoted(self.term_state.current_term(), self.membership.my_id().clone());
        self.election_state.transition_to_leader();
        self.election_timer.cancel();
        self.membership.set_my_role(ServerRole::Leader);
        slog::info!(
            self.logger,
            "Became leader for term {:?} with {} peer(s)",
            self.term_state.current_term(),
            self.membership.peers().len()
        );

        let targets = self.membership.active_targets(&self.down_peers);
        if targets.is_empty() {
            return;
        }
        let message = self.heartbeat_message(ServerRole::Leader, self.membership.servers());
        tokio::task::spawn(heartbeat::announce(
            self.logger.clone(),
            self.transport.clone(),
            message,
            targets,
            self.timeouts.heartbeat,
            self.actor_client.clone(),
        ));
    }

    /// Adopt a strictly higher term seen in any reply and fall back to follower with no leader.
    pub(super) fn step_down(&mut self, new_term: Term) {
        if !self.term_state.store_term_if_increased(new_term) {
            return;
        }

        slog::warn!(
            self.logger,
            "Observed higher term {:?}. Stepping down from {:?}.",
            new_term,
            self.election_state
        );
        self.election_state.transition_to_follower(None);
        self.membership.set_my_role(ServerRole::Follower);
        self.election_timer.reset();
    }

    // ------- Inbound heartbeats --------

    pub(crate) fn handle_heartbeat(&mut self, message: HeartbeatMessage, now: Instant) -> HeartbeatReply {
        let current_term = self.term_state.current_term();
        if message.term < current_term {
            slog::info!(
                self.logger,
                "Refusing {} heartbeat from {} with stale term {:?}",
                message.role,
                message.server_id,
                message.term
            );
            return self.heartbeat_reply(false);
        }

        match message.role {
            ServerRole::Candidate => self.handle_vote_request(message),
            ServerRole::Leader => self.handle_leader_heartbeat(message, now),
            ServerRole::Follower => {
                // A follower probing us. Only thing to learn is the term.
                if message.term > current_term {
                    self.step_down(message.term);
                }
                self.heartbeat_reply(true)
            }
        }
    }

    fn handle_vote_request(&mut self, message: HeartbeatMessage) -> HeartbeatReply {
        if message.term > self.term_state.current_term() {
            self.step_down(message.term);
        }

        let granted = !self.election_state.is_leader()
            && self
                .term_state
                .store_vote_for_term_if_unvoted(message.term, message.server_id.clone());

        if granted {
            slog::info!(self.logger, "Voting for {} in term {:?}", message.server_id, message.term);
            self.election_timer.reset();
        } else {
            slog::info!(
                self.logger,
                "Not voting for {} in term {:?}. Already voted for {:?}.",
                message.server_id,
                message.term,
                self.term_state.voted_for()
            );
        }

        self.heartbeat_reply(granted)
    }

    fn handle_leader_heartbeat(&mut self, message: HeartbeatMessage, now: Instant) -> HeartbeatReply {
        if message.term == self.term_state.current_term() && self.election_state.is_leader() {
            // Two leaders in one term. We have no tie breaker, so both keep refusing each other
            // until someone's term moves.
            slog::warn!(
                self.logger,
                "Split leadership: {} also claims leadership of term {:?}",
                message.server_id,
                message.term
            );
            return self.heartbeat_reply(false);
        }

        self.term_state.store_term_if_increased(message.term);
        self.follow(&message.server_id, now);

        for info in message.servers.iter() {
            if self.membership.add_peer_if_unknown(info) {
                slog::info!(self.logger, "Learned about {} at {} from leader", info.server_id, info.address);
            }
        }
        self.membership.update_peer_role(&message.server_id, ServerRole::Leader);

        self.heartbeat_reply(true)
    }

    /// Become (or stay) a follower of `leader` and treat this moment as proof it's alive.
    pub(super) fn follow(&mut self, leader: &ServerId, now: Instant) {
        if self.election_state.current_leader() != CurrentLeader::Other(leader.clone()) {
            slog::info!(
                self.logger,
                "Following {} in term {:?}",
                leader,
                self.term_state.current_term()
            );
            self.election_state.transition_to_follower(Some(leader.clone()));
            self.membership.set_my_role(ServerRole::Follower);
        }

        self.election_timer.reset();
        self.peer_health.record_success(leader, now);
        self.down_peers.remove(leader);
    }

    fn heartbeat_reply(&self, success: bool) -> HeartbeatReply {
        HeartbeatReply {
            term: self.term_state.current_term(),
            success,
            role: Some(self.election_state.role()),
        }
    }

    pub(super) fn heartbeat_message(&self, role: ServerRole, servers: Vec<ServerInfo>) -> HeartbeatMessage {
        HeartbeatMessage {
            server_id: self.membership.my_id().clone(),
            term: self.term_state.current_term(),
            role,
            timestamp_millis: Utc::now().timestamp_millis(),
            servers,
        }
    }

    // ------- Views --------

    pub(crate) fn network_state(&self) -> NetworkState {
        NetworkState {
            servers: self.membership.servers(),
            leader_id: self.election_state.leader_id(),
            term: self.term_state.current_term(),
        }
    }

    pub(crate) fn cluster_view(&self) -> ClusterView {
        ClusterView {
            server_id: self.membership.my_id().to_string(),
            address: self.membership.my_address().to_string(),
            term: self.term_state.current_term().as_u64(),
            role: self.election_state.role(),
            leader_id: self.election_state.leader_id().map(ServerId::into_inner),
            peers: self.membership.peers().to_btree_map(),
            down_peers: self.down_peers.iter().map(|id| id.to_string()).collect(),
            operation_count: self.operation_log.len(),
            last_operation_id: self.operation_log.last_operation_id(),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::actor::{ActorClient, Event};
    use crate::replica::peer_client::TransportError;
    use crate::replica::peers::parse_seed_peers;
    use crate::replica::replica_api::{JoinReply, JoinRequest, OperationRequest};
    use slog::Drain;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    pub(crate) fn test_logger() -> slog::Logger {
        let decorator = slog_term::PlainSyncDecorator::new(slog_term::TestStdoutWriter);
        let drain = slog_term::FullFormat::new(decorator).build().fuse();
        slog::Logger::root(drain, slog::o!())
    }

    /// FakeTransport answers from canned per-address replies. Unknown addresses are unavailable.
    #[derive(Default)]
    pub(crate) struct FakeTransport {
        pub(crate) heartbeat_replies: Mutex<HashMap<String, Result<HeartbeatReply, TransportError>>>,
        pub(crate) join_replies: Mutex<HashMap<String, Result<JoinReply, TransportError>>>,
        pub(crate) replicate_replies: Mutex<HashMap<String, Result<bool, TransportError>>>,
        pub(crate) calls: Mutex<Vec<String>>,
    }

    impl FakeTransport {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn unavailable(address: &str) -> TransportError {
            TransportError::Unavailable(format!("no route to {}", address))
        }
    }

    #[async_trait::async_trait]
    impl PeerTransport for FakeTransport {
        async fn heartbeat(
            &self,
            address: &str,
            message: HeartbeatMessage,
            _timeout: Duration,
        ) -> Result<HeartbeatReply, TransportError> {
            self.record(format!("heartbeat:{}:{}", message.role, address));
            self.heartbeat_replies
                .lock()
                .unwrap()
                .get(address)
                .cloned()
                .unwrap_or_else(|| Err(Self::unavailable(address)))
        }

        async fn join_network(
            &self,
            address: &str,
            _request: JoinRequest,
            _timeout: Duration,
        ) -> Result<JoinReply, TransportError> {
            self.record(format!("join:{}", address));
            self.join_replies
                .lock()
                .unwrap()
                .get(address)
                .cloned()
                .unwrap_or_else(|| Err(Self::unavailable(address)))
        }

        async fn replicate_operation(
            &self,
            address: &str,
            request: OperationRequest,
            _timeout: Duration,
        ) -> Result<bool, TransportError> {
            self.record(format!("replicate:{}:{}", request.operation_id, address));
            self.replicate_replies
                .lock()
                .unwrap()
                .get(address)
                .cloned()
                .unwrap_or_else(|| Err(Self::unavailable(address)))
        }
    }

    pub(crate) struct TestReplica {
        pub(crate) replica: Replica,
        pub(crate) transport: Arc<FakeTransport>,
        // Keeps the event queue open so spawned tasks can report back. Tests drain it by hand.
        pub(crate) events: mpsc::Receiver<Event>,
        _actor_client: ActorClient,
    }

    pub(crate) fn timeouts() -> RpcTimeouts {
        RpcTimeouts {
            vote_request: Duration::from_millis(200),
            heartbeat: Duration::from_millis(100),
        }
    }

    pub(crate) fn policy() -> HeartbeatPolicy {
        HeartbeatPolicy {
            interval: Duration::from_secs(1),
            max_missed: 3,
        }
    }

    /// Build a replica with address `h:<id>` and the given seeds ("id:h:port" entries).
    pub(crate) fn test_replica(my_id: &str, seeds: &[&str]) -> TestReplica {
        let my_address = format!("h:{}", my_id);
        let seed_entries: Vec<String> = seeds.iter().map(|s| s.to_string()).collect();
        let membership = Membership::new(
            ServerId::new(my_id),
            my_address.clone(),
            parse_seed_peers(&seed_entries, &my_address),
        );

        let (actor_client, events) = ActorClient::new(100);
        let (election_state, _listener) = ElectionState::new_follower(ServerId::new(my_id));
        let election_timer = ElectionTimer::new(
            Duration::from_secs(30),
            Duration::from_secs(60),
            actor_client.weak(),
        );
        let transport = Arc::new(FakeTransport::default());

        let replica = Replica::new(
            test_logger(),
            membership,
            election_state,
            election_timer,
            transport.clone(),
            actor_client.weak(),
            timeouts(),
            policy(),
        );

        TestReplica {
            replica,
            transport,
            events,
            _actor_client: actor_client,
        }
    }

    pub(crate) fn leader_heartbeat(from: &str, term: u64) -> HeartbeatMessage {
        HeartbeatMessage {
            server_id: ServerId::new(from),
            term: Term::new(term),
            role: ServerRole::Leader,
            timestamp_millis: 0,
            servers: Vec::new(),
        }
    }

    pub(crate) fn granted_vote(peer: &str, term: u64) -> VoteReplyFromPeer {
        VoteReplyFromPeer {
            peer_id: ServerId::new(peer),
            term: Term::new(term),
            result: ok_reply(term, true, ServerRole::Follower),
        }
    }

    pub(crate) fn ok_reply(term: u64, success: bool, role: ServerRole) -> Result<HeartbeatReply, TransportError> {
        Ok(HeartbeatReply {
            term: Term::new(term),
            success,
            role: Some(role),
        })
    }
}
