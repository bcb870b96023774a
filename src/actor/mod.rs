use crate::replica::{
    ClusterView, FanOutPlan, HeartbeatMessage, HeartbeatPlan, HeartbeatReply, HeartbeatRound, JoinReply, JoinRequest,
    LeaderProbe, LeaderProbeResult, NetworkState, OperationRecord, OperationRequest, PeerTarget, Replica,
    ReplicateInput, ReplicateInputError, ReplicateOperationOutput, VoteReplyFromPeer,
};
use bytes::Bytes;
use std::fmt::Debug;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

// Every variant is handled synchronously by the actor. Anything that needs the network is done by
// a spawned task which reports back with a follow-up event.
#[derive(Debug)]
pub(crate) enum Event {
    // Lifecycle. Start arms the election timer and hands back the seeds to join through.
    Start(Callback<Vec<PeerTarget>>),
    Shutdown(Callback<()>),

    // Election
    ElectionTimeout(u64),
    VoteReply(VoteReplyFromPeer),

    // Heartbeats. Inbound ones may be leader announcements, vote requests or leader probes.
    Heartbeat(HeartbeatMessage, Callback<HeartbeatReply>),
    HeartbeatTick(Callback<HeartbeatPlan>),
    HeartbeatRoundCompleted(HeartbeatRound),
    LeaderProbePlan(Callback<Option<LeaderProbe>>),
    LeaderProbeCompleted(LeaderProbeResult, Callback<bool>),

    // Membership
    JoinNetwork(JoinRequest, Callback<JoinReply>),
    JoinCompleted(Option<JoinReply>),

    // Replication
    Replicate(ReplicateInput, Callback<Result<FanOutPlan, ReplicateInputError>>),
    ReplicateOperation(OperationRequest, Callback<ReplicateOperationOutput>),
    RecordOperationResult(u64, Bytes, Callback<bool>),

    // Read-only views
    NetworkState(Callback<NetworkState>),
    ClusterView(Callback<ClusterView>),
    OperationRecords(Callback<Vec<OperationRecord>>),
}

#[derive(Debug)]
pub(crate) struct Callback<T: Debug>(oneshot::Sender<T>);

impl<T: Debug> Callback<T> {
    pub(crate) fn send(self, message: T) {
        // Caller may have given up waiting (e.g. RPC deadline). Nothing to do about that.
        let _ = self.0.send(message);
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Replica actor has exited")]
pub(crate) struct ActorExited;

/// ActorClient keeps the actor alive. Once every ActorClient is dropped the event loop exits,
/// even if `WeakActorClient`s are still around.
pub(crate) struct ActorClient {
    sender: mpsc::Sender<Event>,
}

impl ActorClient {
    pub(crate) fn new(buffer_size: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(buffer_size);

        (ActorClient { sender: tx }, rx)
    }

    pub(crate) fn weak(&self) -> WeakActorClient {
        WeakActorClient {
            sender: self.sender.downgrade(),
        }
    }
}

/// WeakActorClient is what background tasks and the RPC server hold, so they never keep a
/// shut down replica alive.
#[derive(Clone)]
pub(crate) struct WeakActorClient {
    sender: mpsc::WeakSender<Event>,
}

impl WeakActorClient {
    pub(crate) async fn start(&self) -> Result<Vec<PeerTarget>, ActorExited> {
        self.call(Event::Start).await
    }

    pub(crate) async fn shutdown(&self) -> Result<(), ActorExited> {
        self.call(Event::Shutdown).await
    }

    pub(crate) async fn election_timeout(&self, generation: u64) -> Result<(), ActorExited> {
        self.send(Event::ElectionTimeout(generation)).await
    }

    pub(crate) async fn vote_reply(&self, reply: VoteReplyFromPeer) -> Result<(), ActorExited> {
        self.send(Event::VoteReply(reply)).await
    }

    pub(crate) async fn heartbeat(&self, message: HeartbeatMessage) -> Result<HeartbeatReply, ActorExited> {
        self.call(|cb| Event::Heartbeat(message, cb)).await
    }

    pub(crate) async fn heartbeat_tick(&self) -> Result<HeartbeatPlan, ActorExited> {
        self.call(Event::HeartbeatTick).await
    }

    pub(crate) async fn heartbeat_round_completed(&self, round: HeartbeatRound) -> Result<(), ActorExited> {
        self.send(Event::HeartbeatRoundCompleted(round)).await
    }

    pub(crate) async fn leader_probe_plan(&self) -> Result<Option<LeaderProbe>, ActorExited> {
        self.call(Event::LeaderProbePlan).await
    }

    pub(crate) async fn leader_probe_completed(&self, result: LeaderProbeResult) -> Result<bool, ActorExited> {
        self.call(|cb| Event::LeaderProbeCompleted(result, cb)).await
    }

    pub(crate) async fn join_network(&self, request: JoinRequest) -> Result<JoinReply, ActorExited> {
        self.call(|cb| Event::JoinNetwork(request, cb)).await
    }

    pub(crate) async fn join_completed(&self, reply: Option<JoinReply>) -> Result<(), ActorExited> {
        self.send(Event::JoinCompleted(reply)).await
    }

    pub(crate) async fn replicate(&self, input: ReplicateInput) -> Result<FanOutPlan, ReplicateInputError> {
        self.call(|cb| Event::Replicate(input, cb))
            .await
            .map_err(|_| ReplicateInputError::ActorExited)?
    }

    pub(crate) async fn replicate_operation(
        &self,
        request: OperationRequest,
    ) -> Result<ReplicateOperationOutput, ActorExited> {
        self.call(|cb| Event::ReplicateOperation(request, cb)).await
    }

    pub(crate) async fn record_operation_result(&self, operation_id: u64, result: Bytes) -> Result<bool, ActorExited> {
        self.call(|cb| Event::RecordOperationResult(operation_id, result, cb)).await
    }

    pub(crate) async fn operation_records(&self) -> Result<Vec<OperationRecord>, ActorExited> {
        self.call(Event::OperationRecords).await
    }

    pub(crate) async fn network_state(&self) -> Result<NetworkState, ActorExited> {
        self.call(Event::NetworkState).await
    }

    pub(crate) async fn cluster_view(&self) -> Result<ClusterView, ActorExited> {
        self.call(Event::ClusterView).await
    }

    async fn call<T, F>(&self, to_event: F) -> Result<T, ActorExited>
    where
        T: Debug,
        F: FnOnce(Callback<T>) -> Event,
    {
        let (tx, rx) = oneshot::channel();
        self.send(to_event(Callback(tx))).await?;

        rx.await.map_err(|_| ActorExited)
    }

    async fn send(&self, event: Event) -> Result<(), ActorExited> {
        let sender = self.sender.upgrade().ok_or(ActorExited)?;
        sender.send(event).await.map_err(|_| ActorExited)
    }
}

/// ReplicaActor is replica logic in actor model.
pub(crate) struct ReplicaActor {
    logger: slog::Logger,
    receiver: mpsc::Receiver<Event>,
    replica: Replica,
}

impl ReplicaActor {
    pub(crate) fn new(logger: slog::Logger, receiver: mpsc::Receiver<Event>, replica: Replica) -> Self {
        ReplicaActor {
            logger,
            receiver,
            replica,
        }
    }

    pub(crate) async fn run_event_loop(mut self) {
        while let Some(event) = self.receiver.recv().await {
            slog::trace!(self.logger, "Event: {:?}", event);
            self.handle_event(event);
        }

        slog::info!(self.logger, "Replica actor event loop exited");
    }

    // This must NOT be async. Any long running work must be spawned on another task and come
    // back as an event to this actor.
    fn handle_event(&mut self, event: Event) {
        let now = Instant::now();
        match event {
            Event::Start(callback) => callback.send(self.replica.handle_start()),
            Event::Shutdown(callback) => callback.send(self.replica.handle_shutdown()),
            Event::ElectionTimeout(generation) => self.replica.handle_election_timeout(generation),
            Event::VoteReply(reply) => self.replica.handle_vote_reply(reply),
            Event::Heartbeat(message, callback) => callback.send(self.replica.handle_heartbeat(message, now)),
            Event::HeartbeatTick(callback) => callback.send(self.replica.handle_heartbeat_tick(now)),
            Event::HeartbeatRoundCompleted(round) => self.replica.handle_heartbeat_round(round, now),
            Event::LeaderProbePlan(callback) => callback.send(self.replica.handle_leader_probe_plan()),
            Event::LeaderProbeCompleted(result, callback) => {
                callback.send(self.replica.handle_leader_probe_result(result, now))
            }
            Event::JoinNetwork(request, callback) => callback.send(self.replica.handle_join_network(request)),
            Event::JoinCompleted(reply) => self.replica.handle_join_completed(reply, now),
            Event::Replicate(input, callback) => callback.send(self.replica.handle_replicate(input)),
            Event::ReplicateOperation(request, callback) => {
                callback.send(self.replica.handle_replicate_operation(request, now))
            }
            Event::RecordOperationResult(operation_id, result, callback) => {
                callback.send(self.replica.handle_record_operation_result(operation_id, result))
            }
            Event::NetworkState(callback) => callback.send(self.replica.network_state()),
            Event::ClusterView(callback) => callback.send(self.replica.cluster_view()),
            Event::OperationRecords(callback) => callback.send(self.replica.operation_records()),
        }
    }
}
