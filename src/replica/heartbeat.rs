use crate::actor::{ActorExited, WeakActorClient};
use crate::replica::election::{CurrentLeader, StopCheck};
use crate::replica::peer_client::PeerTransport;
use crate::replica::peers::{PeerTarget, ServerId, ServerRole};
use crate::replica::replica::Replica;
use crate::replica::replica_api::{
    HeartbeatMessage, HeartbeatPlan, HeartbeatReply, HeartbeatRound, LeaderProbe, LeaderProbeResult,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinError;
use tokio::time::{Duration, Instant};

#[derive(Copy, Clone, Debug)]
pub(crate) struct HeartbeatPolicy {
    pub(crate) interval: Duration,
    // A peer that misses this many heartbeats in a row (or stays silent for this many intervals)
    // is considered gone.
    pub(crate) max_missed: u32,
}

impl HeartbeatPolicy {
    fn silence_threshold(&self) -> Duration {
        self.interval * self.max_missed
    }

    /// Eviction rule for peers a leader can't reach. A peer we've heard from before gets the
    /// silence window. A peer we've never heard from gets `max_missed` attempts.
    pub(crate) fn should_evict(&self, health: &PeerHealth, now: Instant) -> bool {
        match health.last_success {
            Some(last_success) => now.saturating_duration_since(last_success) > self.silence_threshold(),
            None => health.consecutive_failures >= self.max_missed,
        }
    }

    /// Same rule from a follower's point of view, applied to its leader.
    pub(crate) fn is_leader_presumed_dead(&self, health: Option<&PeerHealth>, now: Instant) -> bool {
        match health {
            None => false,
            Some(health) => {
                health.consecutive_failures >= self.max_missed
                    || matches!(health.last_success,
                        Some(t) if now.saturating_duration_since(t) > self.silence_threshold())
            }
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct PeerHealth {
    pub(crate) consecutive_failures: u32,
    pub(crate) last_success: Option<Instant>,
}

#[derive(Default)]
pub(crate) struct PeerHealthTracker {
    records: HashMap<ServerId, PeerHealth>,
}

impl PeerHealthTracker {
    pub(crate) fn record_success(&mut self, id: &ServerId, now: Instant) {
        let health = self.records.entry(id.clone()).or_default();
        health.consecutive_failures = 0;
        health.last_success = Some(now);
    }

    /// Returns the updated number of consecutive failures.
    pub(crate) fn record_failure(&mut self, id: &ServerId) -> u32 {
        let health = self.records.entry(id.clone()).or_default();
        health.consecutive_failures += 1;
        health.consecutive_failures
    }

    pub(crate) fn get(&self, id: &ServerId) -> Option<&PeerHealth> {
        self.records.get(id)
    }

    /// Start over with a blank record, e.g. after a (re)join.
    pub(crate) fn reset(&mut self, id: &ServerId) {
        self.records.insert(id.clone(), PeerHealth::default());
    }

    pub(crate) fn remove(&mut self, id: &ServerId) {
        self.records.remove(id);
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }
}

/// Verbose for the first few failures, then every 10th, so a dead peer doesn't flood the log.
fn log_peer_failure(logger: &slog::Logger, peer: &ServerId, failures: u32, error: &str) {
    if failures <= 3 || failures % 10 == 0 {
        slog::warn!(logger, "Heartbeat to {} failed ({} in a row): {}", peer, failures, error);
    } else {
        slog::debug!(logger, "Heartbeat to {} failed ({} in a row): {}", peer, failures, error);
    }
}

impl Replica {
    pub(crate) fn handle_heartbeat_tick(&mut self, now: Instant) -> HeartbeatPlan {
        if !self.is_running {
            return HeartbeatPlan::Idle;
        }

        match self.election_state.current_leader() {
            CurrentLeader::Me => HeartbeatPlan::Broadcast {
                message: self.heartbeat_message(ServerRole::Leader, self.membership.servers()),
                targets: self.membership.peers().targets(),
            },
            CurrentLeader::Other(leader_id) => {
                let address = match self.membership.peers().address(&leader_id) {
                    Some(address) => address.to_string(),
                    None => {
                        self.lose_leader(&leader_id, "leader is no longer in the peer table");
                        return HeartbeatPlan::Idle;
                    }
                };

                if self
                    .heartbeat_policy
                    .is_leader_presumed_dead(self.peer_health.get(&leader_id), now)
                {
                    self.lose_leader(&leader_id, "missed too many heartbeats");
                    return HeartbeatPlan::Idle;
                }

                HeartbeatPlan::ProbeLeader(LeaderProbe {
                    leader: PeerTarget {
                        id: leader_id,
                        address,
                    },
                    message: self.heartbeat_message(ServerRole::Follower, Vec::new()),
                })
            }
            CurrentLeader::Unknown => HeartbeatPlan::Idle,
        }
    }

    fn lose_leader(&mut self, leader_id: &ServerId, reason: &str) {
        slog::warn!(self.logger, "Lost leader {}: {}", leader_id, reason);
        self.election_state.clear_leader_if_follower();
        self.election_timer.reset();
    }

    pub(crate) fn handle_heartbeat_round(&mut self, round: HeartbeatRound, now: Instant) {
        if round.term != self.term_state.current_term() || !self.election_state.is_leader() {
            slog::debug!(self.logger, "Discarding heartbeat round for term {:?}", round.term);
            return;
        }

        let mut evictions = Vec::new();
        for (target, result) in round.replies {
            if let Ok(reply) = &result {
                if reply.term > self.term_state.current_term() {
                    self.step_down(reply.term);
                    return;
                }
            }
            // Removed while the round was in flight. Nothing left to track.
            if !self.membership.peers().contains(&target.id) {
                continue;
            }

            let error = match result {
                Ok(HeartbeatReply { success: true, role, .. }) => {
                    if let Some(role) = role {
                        self.membership.update_peer_role(&target.id, role);
                    }
                    self.peer_health.record_success(&target.id, now);
                    self.down_peers.remove(&target.id);
                    continue;
                }
                Ok(_) => "heartbeat refused".to_string(),
                Err(e) => e.to_string(),
            };

            let failures = self.peer_health.record_failure(&target.id);
            log_peer_failure(&self.logger, &target.id, failures, &error);

            if let Some(health) = self.peer_health.get(&target.id) {
                if self.heartbeat_policy.should_evict(health, now) {
                    evictions.push(target.id);
                }
            }
        }

        for id in evictions {
            self.membership.remove_peer(&id);
            self.down_peers.remove(&id);
            self.peer_health.remove(&id);
            slog::info!(self.logger, "Evicted unresponsive peer {}", id);
        }
    }

    /// Plan for an on-demand leader check. None unless we're a follower with a reachable leader.
    pub(crate) fn handle_leader_probe_plan(&self) -> Option<LeaderProbe> {
        match self.election_state.current_leader() {
            CurrentLeader::Other(leader_id) => {
                let address = self.membership.peers().address(&leader_id)?.to_string();
                Some(LeaderProbe {
                    leader: PeerTarget {
                        id: leader_id,
                        address,
                    },
                    message: self.heartbeat_message(ServerRole::Follower, Vec::new()),
                })
            }
            CurrentLeader::Me | CurrentLeader::Unknown => None,
        }
    }

    /// Returns whether the leader answered as leader.
    pub(crate) fn handle_leader_probe_result(&mut self, probe: LeaderProbeResult, now: Instant) -> bool {
        let alive = matches!(&probe.result,
            Ok(reply) if reply.success && reply.role == Some(ServerRole::Leader));

        if let Ok(reply) = &probe.result {
            if reply.term > self.term_state.current_term() {
                self.term_state.store_term_if_increased(reply.term);
                if alive {
                    self.follow(&probe.leader_id, now);
                } else {
                    self.step_down_to_leaderless();
                }
                return alive;
            }
        }

        let still_same_leader = probe.term == self.term_state.current_term()
            && self.election_state.current_leader() == CurrentLeader::Other(probe.leader_id.clone());
        if !still_same_leader {
            return alive;
        }

        if alive {
            self.peer_health.record_success(&probe.leader_id, now);
            self.down_peers.remove(&probe.leader_id);
            return true;
        }

        let failures = self.peer_health.record_failure(&probe.leader_id);
        let error = match &probe.result {
            Ok(_) => "no longer leader".to_string(),
            Err(e) => e.to_string(),
        };
        log_peer_failure(&self.logger, &probe.leader_id, failures, &error);

        if probe.elect_on_failure {
            slog::warn!(self.logger, "Leader {} failed liveness check. Starting election.", probe.leader_id);
            self.start_election();
        }

        false
    }

    fn step_down_to_leaderless(&mut self) {
        self.election_state.transition_to_follower(None);
        self.membership.set_my_role(ServerRole::Follower);
        self.election_timer.reset();
    }
}

/// Send `message` to every target concurrently and collect replies in target order.
pub(crate) async fn broadcast(
    transport: Arc<dyn PeerTransport>,
    message: HeartbeatMessage,
    targets: Vec<PeerTarget>,
    timeout: Duration,
) -> Result<HeartbeatRound, JoinError> {
    let term = message.term;
    let handles: Vec<_> = targets
        .into_iter()
        .map(|target| {
            let transport = transport.clone();
            let message = message.clone();
            tokio::task::spawn(async move {
                let result = transport.heartbeat(&target.address, message, timeout).await;
                (target, result)
            })
        })
        .collect();

    let mut replies = Vec::with_capacity(handles.len());
    for handle in handles {
        replies.push(handle.await?);
    }

    Ok(HeartbeatRound { term, replies })
}

/// One-off broadcast a new leader sends right away instead of waiting for the next tick.
pub(crate) async fn announce(
    logger: slog::Logger,
    transport: Arc<dyn PeerTransport>,
    message: HeartbeatMessage,
    targets: Vec<PeerTarget>,
    timeout: Duration,
    callback: WeakActorClient,
) {
    match broadcast(transport, message, targets, timeout).await {
        Ok(round) => {
            let _ = callback.heartbeat_round_completed(round).await;
        }
        Err(e) => slog::warn!(logger, "Leader announcement failed: {:?}", e),
    }
}

pub(crate) async fn probe_leader(
    transport: &dyn PeerTransport,
    probe: LeaderProbe,
    timeout: Duration,
    elect_on_failure: bool,
) -> LeaderProbeResult {
    let term = probe.message.term;
    let result = transport.heartbeat(&probe.leader.address, probe.message, timeout).await;

    LeaderProbeResult {
        leader_id: probe.leader.id,
        term,
        result,
        elect_on_failure,
    }
}

#[derive(Debug, thiserror::Error)]
enum HeartbeatCycleError {
    #[error(transparent)]
    ActorExited(#[from] ActorExited),
    #[error("Heartbeat task failed: {0}")]
    TaskFailed(#[from] JoinError),
}

/// HeartbeatLoop drives the heartbeat engine: leaders broadcast, followers check on their leader.
/// Runs until stopped or until the replica actor is gone.
pub(crate) struct HeartbeatLoop {
    logger: slog::Logger,
    actor_client: WeakActorClient,
    transport: Arc<dyn PeerTransport>,
    interval: Duration,
    rpc_timeout: Duration,
    error_backoff: Duration,
    stop_check: StopCheck,
}

impl HeartbeatLoop {
    pub(crate) fn new(
        logger: slog::Logger,
        actor_client: WeakActorClient,
        transport: Arc<dyn PeerTransport>,
        interval: Duration,
        rpc_timeout: Duration,
        error_backoff: Duration,
        stop_check: StopCheck,
    ) -> Self {
        HeartbeatLoop {
            logger,
            actor_client,
            transport,
            interval,
            rpc_timeout,
            error_backoff,
            stop_check,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            if self.stop_check.should_stop() {
                break;
            }

            let pause = match self.run_cycle().await {
                Ok(()) => self.interval,
                Err(HeartbeatCycleError::ActorExited(_)) => break,
                Err(e) => {
                    slog::warn!(self.logger, "Heartbeat cycle failed: {}", e);
                    self.error_backoff
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = self.stop_check.stopped() => break,
            }
        }

        slog::info!(self.logger, "Heartbeat loop exited");
    }

    async fn run_cycle(&self) -> Result<(), HeartbeatCycleError> {
        match self.actor_client.heartbeat_tick().await? {
            HeartbeatPlan::Idle => {}
            HeartbeatPlan::Broadcast { message, targets } => {
                let round = broadcast(self.transport.clone(), message, targets, self.rpc_timeout).await?;
                self.actor_client.heartbeat_round_completed(round).await?;
            }
            HeartbeatPlan::ProbeLeader(probe) => {
                let result = probe_leader(self.transport.as_ref(), probe, self.rpc_timeout, false).await;
                self.actor_client.leader_probe_completed(result).await?;
            }
        }

        Ok(())
    }
}
