use crate::replica::election::CurrentLeader;
use crate::replica::local_state::Term;
use crate::replica::peer_client::PeerTransport;
use crate::replica::peers::ServerRole;
use crate::replica::replica::Replica;
use crate::replica::replica_api::{
    FanOutPlan, OperationRecord, OperationRequest, ReplicateInput, ReplicateInputError, ReplicateOperationOutput,
    ReplicationOutcome,
};
use bytes::Bytes;
use std::sync::Arc;
use tokio::time::{Duration, Instant};

/// In-memory record of write operations seen by this replica. Not durable and never truncated.
#[derive(Default)]
pub(crate) struct OperationLog {
    entries: Vec<OperationRecord>,
    last_operation_id: u64,
}

impl OperationLog {
    /// Strictly increasing. Only the actor calls this, so no two callers can see the same id.
    pub(crate) fn next_operation_id(&mut self) -> u64 {
        self.last_operation_id += 1;
        self.last_operation_id
    }

    pub(crate) fn append(&mut self, operation: OperationRecord) {
        // Ids from a leader must not be handed out again if we become leader later.
        if operation.operation_id > self.last_operation_id {
            self.last_operation_id = operation.operation_id;
        }
        self.entries.push(operation);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn last_operation_id(&self) -> u64 {
        self.last_operation_id
    }

    pub(crate) fn entries(&self) -> &[OperationRecord] {
        &self.entries
    }

    /// Attach the service layer's result to the newest entry with this id. False if there is none.
    pub(crate) fn record_result(&mut self, operation_id: u64, result: Bytes) -> bool {
        match self.entries.iter_mut().rev().find(|e| e.operation_id == operation_id) {
            Some(entry) => {
                entry.result = Some(result);
                true
            }
            None => false,
        }
    }
}

impl Replica {
    /// Entry point for a local write. Leader: log and plan the fan-out. Follower of a reachable
    /// leader: refuse, because forwarding isn't supported. Nobody reachable in charge: promote
    /// ourselves and carry on as leader.
    pub(crate) fn handle_replicate(&mut self, input: ReplicateInput) -> Result<FanOutPlan, ReplicateInputError> {
        match self.election_state.current_leader() {
            CurrentLeader::Me => {}
            CurrentLeader::Other(leader_id)
                if self.membership.peers().contains(&leader_id) && !self.down_peers.contains(&leader_id) =>
            {
                slog::warn!(
                    self.logger,
                    "Write {}.{} arrived at follower. Forwarding to leader {} is not supported.",
                    input.service_name,
                    input.method_name,
                    leader_id
                );
                return Err(ReplicateInputError::ForwardingUnavailable { leader_id });
            }
            CurrentLeader::Other(_) | CurrentLeader::Unknown => {
                slog::warn!(
                    self.logger,
                    "No reachable leader for write {}.{}. Promoting self to leader.",
                    input.service_name,
                    input.method_name
                );
                self.become_leader();
            }
        }

        Ok(self.plan_fan_out(input))
    }

    fn plan_fan_out(&mut self, input: ReplicateInput) -> FanOutPlan {
        debug_assert!(self.election_state.is_leader());

        let term = self.term_state.current_term();
        let operation_id = self.operation_log.next_operation_id();
        self.log_operation(&input.service_name, &input.method_name, input.serialized_request.clone(), operation_id, term);

        FanOutPlan {
            request: OperationRequest {
                service_name: input.service_name,
                method_name: input.method_name,
                serialized_request: input.serialized_request,
                operation_id,
                server_id: self.membership.my_id().clone(),
                term,
            },
            targets: self.membership.peers().targets(),
        }
    }

    fn log_operation(&mut self, service_name: &str, method_name: &str, params: Bytes, operation_id: u64, term: Term) {
        self.operation_log.append(OperationRecord {
            service_name: service_name.to_string(),
            method_name: method_name.to_string(),
            params,
            result: None,
            operation_id,
            term: term.as_u64(),
        });
    }

    pub(crate) fn handle_record_operation_result(&mut self, operation_id: u64, result: Bytes) -> bool {
        let recorded = self.operation_log.record_result(operation_id, result);
        if !recorded {
            slog::warn!(self.logger, "No logged operation {} to attach a result to", operation_id);
        }
        recorded
    }

    pub(crate) fn operation_records(&self) -> Vec<OperationRecord> {
        self.operation_log.entries().to_vec()
    }

    /// Receiver side of a leader's fan-out.
    pub(crate) fn handle_replicate_operation(
        &mut self,
        request: OperationRequest,
        now: Instant,
    ) -> ReplicateOperationOutput {
        let current_term = self.term_state.current_term();
        if request.term < current_term {
            slog::info!(
                self.logger,
                "Refusing operation {} from {} with stale term {:?}",
                request.operation_id,
                request.server_id,
                request.term
            );
            return ReplicateOperationOutput { accepted: false };
        }
        if request.term == current_term && self.election_state.is_leader() {
            slog::warn!(
                self.logger,
                "Refusing operation {} from {}: we lead term {:?} too",
                request.operation_id,
                request.server_id,
                request.term
            );
            return ReplicateOperationOutput { accepted: false };
        }

        self.term_state.store_term_if_increased(request.term);
        self.follow(&request.server_id, now);
        self.membership.update_peer_role(&request.server_id, ServerRole::Leader);

        self.log_operation(
            &request.service_name,
            &request.method_name,
            request.serialized_request,
            request.operation_id,
            request.term,
        );

        ReplicateOperationOutput { accepted: true }
    }
}

/// Send the operation to every target concurrently and count acknowledgements. The leader counts
/// itself. Falling short of quorum is logged, never returned as an error.
pub(crate) async fn fan_out(
    logger: slog::Logger,
    transport: Arc<dyn PeerTransport>,
    plan: FanOutPlan,
    timeout: Duration,
) -> ReplicationOutcome {
    let operation_id = plan.request.operation_id;
    let cluster_size = plan.targets.len() + 1;

    let handles: Vec<_> = plan
        .targets
        .into_iter()
        .map(|target| {
            let transport = transport.clone();
            let request = plan.request.clone();
            tokio::task::spawn(async move {
                let result = transport.replicate_operation(&target.address, request, timeout).await;
                (target, result)
            })
        })
        .collect();

    let mut successes = 1;
    for handle in handles {
        match handle.await {
            Ok((_, Ok(true))) => successes += 1,
            Ok((target, Ok(false))) => slog::info!(logger, "Peer {} refused operation {}", target.id, operation_id),
            Ok((target, Err(e))) => slog::warn!(
                logger,
                "Replicating operation {} to {} failed: {}",
                operation_id,
                target.id,
                e
            ),
            Err(e) => slog::warn!(logger, "Replication task for operation {} failed: {:?}", operation_id, e),
        }
    }

    let quorum_reached = 2 * successes > cluster_size;
    if quorum_reached {
        slog::info!(
            logger,
            "Operation {} replicated to quorum ({}/{})",
            operation_id,
            successes,
            cluster_size
        );
    } else {
        slog::warn!(
            logger,
            "Operation {} fell short of quorum ({}/{})",
            operation_id,
            successes,
            cluster_size
        );
    }

    ReplicationOutcome {
        operation_id,
        successes,
        cluster_size,
        quorum_reached,
    }
}
