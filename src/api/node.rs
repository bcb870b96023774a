use crate::actor::{ActorClient, WeakActorClient};
use crate::api::event_bus::ElectionEventListener;
use crate::api::options::ReplicaOptionsValidated;
use crate::replica::{
    self, ClusterView, HeartbeatLoop, JoinRequest, OperationRecord, PeerTransport, ReplicateInput,
    ReplicateInputError, ReplicationOutcome, ServerId, Stopper,
};
use crate::server::RpcServerShutdownHandle;
use bytes::Bytes;
use std::sync::Arc;
use tonic::Status;

#[derive(Debug, thiserror::Error)]
pub enum ReplicateError {
    /// This replica follows a live leader and can't forward writes to it. The caller should retry
    /// against another replica.
    #[error("Not leader. Leader {leader_id} is reachable but writes can't be forwarded to it")]
    ForwardingUnavailable { leader_id: String },
    #[error("Replica has shut down")]
    ReplicaExited,
}

impl ReplicateError {
    /// Status for the service layer to hand back to its own RPC caller.
    pub fn into_status(self) -> Status {
        match self {
            ReplicateError::ForwardingUnavailable { .. } => Status::failed_precondition(self.to_string()),
            ReplicateError::ReplicaExited => Status::unavailable(self.to_string()),
        }
    }
}

impl From<ReplicateInputError> for ReplicateError {
    fn from(e: ReplicateInputError) -> Self {
        match e {
            ReplicateInputError::ForwardingUnavailable { leader_id } => ReplicateError::ForwardingUnavailable {
                leader_id: leader_id.into_inner(),
            },
            ReplicateInputError::ActorExited => ReplicateError::ReplicaExited,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Replica has shut down")]
pub struct ReplicaShutDown;

/// ReplicaNode is the application's handle on a running replica: its RPC server, its background
/// heartbeat loop and the actor that owns its state. Dropping it tears all of that down.
pub struct ReplicaNode {
    pub(super) logger: slog::Logger,
    pub(super) server_id: String,
    pub(super) address: String,
    pub(super) actor_client: ActorClient,
    pub(super) transport: Arc<dyn PeerTransport>,
    pub(super) options: ReplicaOptionsValidated,
    pub(super) election_events: ElectionEventListener,
    pub(super) heartbeat_stopper: Option<Stopper>,
    pub(super) server_shutdown_handle: Option<RpcServerShutdownHandle>,
}

impl ReplicaNode {
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn local_replica(&self) -> WeakActorClient {
        self.actor_client.weak()
    }

    /// Arm the election timer, launch the heartbeat loop and then either join the cluster through
    /// the configured seeds or, with no seeds, become its first leader. Returns once the join has
    /// been applied. Calling it again is a no-op.
    pub async fn start(&mut self) -> Result<(), ReplicaShutDown> {
        if self.heartbeat_stopper.is_some() {
            return Ok(());
        }

        let local_replica = self.local_replica();
        let seeds = local_replica.start().await.map_err(|_| ReplicaShutDown)?;

        let (stopper, stop_check) = replica::stop_signal::new();
        let heartbeat_loop = HeartbeatLoop::new(
            self.logger.clone(),
            local_replica.clone(),
            self.transport.clone(),
            self.options.heartbeat_interval,
            self.options.heartbeat_rpc_timeout,
            self.options.heartbeat_error_backoff,
            stop_check,
        );
        tokio::spawn(heartbeat_loop.run());
        self.heartbeat_stopper = Some(stopper);

        let reply = if seeds.is_empty() {
            None
        } else {
            let request = JoinRequest {
                server_id: ServerId::new(self.server_id.clone()),
                address: self.address.clone(),
            };
            replica::join_network(
                self.logger.clone(),
                self.transport.as_ref(),
                request,
                seeds,
                self.options.join_timeout,
            )
            .await
        };

        local_replica.join_completed(reply).await.map_err(|_| ReplicaShutDown)
    }

    /// Replicate a write to the followers. Call this before applying the write locally.
    ///
    /// As leader the write gets the next operation id, is logged and fanned out, and the outcome
    /// is returned even when quorum wasn't reached. A follower of a reachable leader returns
    /// `ForwardingUnavailable`. A replica with no reachable leader promotes itself first.
    pub async fn replicate_to_followers(
        &self,
        service_name: impl Into<String>,
        method_name: impl Into<String>,
        serialized_request: Bytes,
    ) -> Result<ReplicationOutcome, ReplicateError> {
        let input = ReplicateInput {
            service_name: service_name.into(),
            method_name: method_name.into(),
            serialized_request,
        };
        let plan = self.local_replica().replicate(input).await?;

        Ok(replica::fan_out(
            self.logger.clone(),
            self.transport.clone(),
            plan,
            self.options.replicate_timeout,
        )
        .await)
    }

    /// Ask the leader right now whether it's alive. `Some(true)` if it answered as leader.
    /// `Some(false)` if it didn't, in which case an election has been started. `None` when this
    /// replica isn't a follower with a known leader.
    pub async fn check_leader_status(&self) -> Option<bool> {
        let local_replica = self.local_replica();
        let probe = local_replica.leader_probe_plan().await.ok()??;
        let result = replica::probe_leader(
            self.transport.as_ref(),
            probe,
            self.options.heartbeat_rpc_timeout,
            true,
        )
        .await;

        local_replica.leader_probe_completed(result).await.ok()
    }

    pub async fn cluster_view(&self) -> Result<ClusterView, ReplicaShutDown> {
        self.local_replica()
            .cluster_view()
            .await
            .map_err(|_| ReplicaShutDown)
    }

    /// Attach what applying an operation produced to its log entry. Returns false if this replica
    /// never logged `operation_id`.
    pub async fn record_operation_result(&self, operation_id: u64, result: Bytes) -> Result<bool, ReplicaShutDown> {
        self.local_replica()
            .record_operation_result(operation_id, result)
            .await
            .map_err(|_| ReplicaShutDown)
    }

    /// Every operation this replica has logged, oldest first.
    pub async fn operation_log(&self) -> Result<Vec<OperationRecord>, ReplicaShutDown> {
        self.local_replica()
            .operation_records()
            .await
            .map_err(|_| ReplicaShutDown)
    }

    pub fn election_events(&self) -> ElectionEventListener {
        self.election_events.clone()
    }

    /// Stop taking part in the cluster. Peers will notice through missed heartbeats.
    pub async fn shutdown(mut self) {
        if self.local_replica().shutdown().await.is_err() {
            slog::warn!(self.logger, "Replica actor was already gone at shutdown");
        }

        if let Some(stopper) = self.heartbeat_stopper.take() {
            stopper.stop();
        }
        if let Some(handle) = self.server_shutdown_handle.take() {
            handle.shutdown();
        }

        slog::info!(self.logger, "Replica {} shut down", self.server_id);
    }
}
