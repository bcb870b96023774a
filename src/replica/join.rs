use crate::replica::peer_client::PeerTransport;
use crate::replica::peers::{PeerTarget, ServerId, ServerRole};
use crate::replica::replica::Replica;
use crate::replica::replica_api::{JoinReply, JoinRequest};
use tokio::time::{Duration, Instant};

impl Replica {
    /// Receiver side of a join. Only a replica that knows who leads can vouch for the cluster.
    pub(crate) fn handle_join_network(&mut self, request: JoinRequest) -> JoinReply {
        let term = self.term_state.current_term();
        let leader_id = match self.election_state.leader_id() {
            Some(leader_id) => leader_id,
            None => {
                slog::info!(self.logger, "Refusing join from {}: no known leader", request.server_id);
                return JoinReply::refused(term);
            }
        };

        let evicted = self
            .membership
            .add_peer(request.server_id.clone(), request.address.clone(), ServerRole::Follower);
        for old_id in evicted {
            slog::info!(
                self.logger,
                "{} took over address {} from {}",
                request.server_id,
                request.address,
                old_id
            );
            self.down_peers.remove(&old_id);
            self.peer_health.remove(&old_id);
        }
        self.down_peers.remove(&request.server_id);
        self.peer_health.reset(&request.server_id);
        slog::info!(self.logger, "Accepted join from {} at {}", request.server_id, request.address);

        let mut server_addresses: Vec<(ServerId, String)> = self
            .membership
            .peers()
            .targets()
            .into_iter()
            .map(|target| (target.id, target.address))
            .collect();
        server_addresses.push((
            self.membership.my_id().clone(),
            self.membership.my_address().to_string(),
        ));

        JoinReply {
            success: true,
            term,
            leader_id: Some(leader_id),
            servers: self.membership.servers(),
            server_addresses,
        }
    }

    /// Apply the outcome of our own join attempt. No reply means nobody answered, so we start a
    /// cluster of our own.
    pub(crate) fn handle_join_completed(&mut self, reply: Option<JoinReply>, now: Instant) {
        let reply = match reply {
            Some(reply) => reply,
            None => {
                slog::info!(self.logger, "No seed accepted our join. Bootstrapping as leader.");
                self.become_leader();
                return;
            }
        };

        // A reply from an older term still describes the members, but its leader has since been
        // replaced (or soon will be) by whoever moved the term on.
        let stale = reply.term < self.term_state.current_term();
        self.term_state.store_term_if_increased(reply.term);
        let dropped = self.membership.replace_from_join(reply.servers, reply.server_addresses);
        for info in dropped {
            slog::warn!(
                self.logger,
                "Dropping {} from join view: address {} already taken",
                info.server_id,
                info.address
            );
        }

        self.down_peers.clear();
        self.peer_health.clear();
        let leader_id = reply
            .leader_id
            .filter(|id| id != self.membership.my_id())
            .filter(|_| !stale);
        match &leader_id {
            Some(leader_id) => self.peer_health.record_success(leader_id, now),
            None if stale => slog::warn!(
                self.logger,
                "Join reply is from term {:?}, behind ours. Not following its leader.",
                reply.term
            ),
            None => slog::warn!(self.logger, "Joined a cluster that reported no leader"),
        }
        self.election_state.transition_to_follower(leader_id);
        self.election_timer.reset();

        slog::info!(
            self.logger,
            "Joined cluster at term {:?}. Peers: {:?}",
            self.term_state.current_term(),
            self.membership.peers().to_btree_map()
        );
    }
}

/// Try seeds in order until one accepts. If the one that accepted isn't the leader, also introduce
/// ourselves to the leader directly and prefer its view.
pub(crate) async fn join_network(
    logger: slog::Logger,
    transport: &dyn PeerTransport,
    request: JoinRequest,
    seeds: Vec<PeerTarget>,
    timeout: Duration,
) -> Option<JoinReply> {
    for seed in seeds {
        let reply = match transport.join_network(&seed.address, request.clone(), timeout).await {
            Ok(reply) if reply.success => reply,
            Ok(_) => {
                slog::info!(logger, "Seed {} at {} refused join", seed.id, seed.address);
                continue;
            }
            Err(e) => {
                slog::warn!(logger, "Join via seed {} at {} failed: {}", seed.id, seed.address, e);
                continue;
            }
        };

        let leader_address = match reply.leader_address() {
            Some(address) if address != seed.address && address != request.address => address.to_string(),
            _ => return Some(reply),
        };

        match transport.join_network(&leader_address, request.clone(), timeout).await {
            Ok(leader_reply) if leader_reply.success => return Some(leader_reply),
            Ok(_) => slog::info!(logger, "Leader at {} refused join. Using seed's view.", leader_address),
            Err(e) => slog::warn!(logger, "Join via leader at {} failed: {}. Using seed's view.", leader_address, e),
        }
        return Some(reply);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replica::election::ElectionStateSnapshot;
    use crate::replica::local_state::Term;
    use crate::replica::peers::ServerInfo;
    use crate::replica::replica::test_support::*;
    use std::collections::HashSet;

    fn request(id: &str) -> JoinRequest {
        JoinRequest {
            server_id: ServerId::new(id),
            address: format!("h:{}", id),
        }
    }

    #[tokio::test]
    async fn refuses_join_without_leader() {
        let mut t = test_replica("a", &[]);
        t.replica.handle_start();

        let reply = t.replica.handle_join_network(request("b"));
        assert!(!reply.success);
        assert!(!t.replica.membership.peers().contains(&ServerId::new("b")));
    }

    #[tokio::test]
    async fn leader_accepts_join_and_returns_full_view() {
        let mut t = test_replica("a", &[]);
        t.replica.handle_start();
        t.replica.handle_join_completed(None, Instant::now());
        assert!(t.replica.election_state.is_leader());

        t.replica.handle_join_network(request("b"));
        let reply = t.replica.handle_join_network(request("c"));

        assert!(reply.success);
        assert_eq!(Some(ServerId::new("a")), reply.leader_id);
        let ids: Vec<_> = reply.servers.iter().map(|s| s.server_id.to_string()).collect();
        assert_eq!(vec!["a", "b", "c"], ids);
        assert_eq!(ServerRole::Leader, reply.servers[0].role);
        assert_eq!(3, reply.server_addresses.len());
    }

    #[tokio::test]
    async fn rejoin_at_same_address_evicts_old_id() {
        let mut t = test_replica("a", &[]);
        t.replica.handle_start();
        t.replica.become_leader();

        t.replica.handle_join_network(JoinRequest {
            server_id: ServerId::new("old"),
            address: "h:x".into(),
        });
        t.replica.handle_join_network(JoinRequest {
            server_id: ServerId::new("new"),
            address: "h:x".into(),
        });

        assert!(!t.replica.membership.peers().contains(&ServerId::new("old")));
        assert_eq!(Some("h:x"), t.replica.membership.peers().address(&ServerId::new("new")));
    }

    #[tokio::test]
    async fn applying_join_reply_leaves_no_duplicate_addresses() {
        let mut t = test_replica("c", &["127.0.0.1:5001"]);
        t.replica.handle_start();

        let reply = JoinReply {
            success: true,
            term: Term::new(3),
            leader_id: Some(ServerId::new("a")),
            servers: vec![
                ServerInfo {
                    server_id: ServerId::new("a"),
                    address: "h:a".into(),
                    role: ServerRole::Leader,
                },
                ServerInfo {
                    server_id: ServerId::new("b"),
                    address: "h:b".into(),
                    role: ServerRole::Follower,
                },
                ServerInfo {
                    server_id: ServerId::new("ghost"),
                    address: "h:b".into(),
                    role: ServerRole::Follower,
                },
                ServerInfo {
                    server_id: ServerId::new("c"),
                    address: "h:c".into(),
                    role: ServerRole::Follower,
                },
            ],
            server_addresses: vec![(ServerId::new("a"), "h:a".into()), (ServerId::new("d"), "h:d".into())],
        };
        t.replica.handle_join_completed(Some(reply), Instant::now());

        let peers = t.replica.membership.peers().to_btree_map();
        let addresses: HashSet<_> = peers.values().collect();
        assert_eq!(peers.len(), addresses.len());
        assert_eq!(vec!["a", "b", "d"], peers.keys().map(String::as_str).collect::<Vec<_>>());
        assert_eq!(Term::new(3), t.replica.term_state.current_term());
        assert_eq!(
            ElectionStateSnapshot::Follower(ServerId::new("a")),
            t.replica.election_state.current_state()
        );
        assert!(t.replica.election_timer.is_armed());
    }

    #[tokio::test]
    async fn join_reply_from_older_term_keeps_our_term() {
        let mut t = test_replica("c", &["a:h:a"]);
        t.replica.handle_start();
        t.replica.handle_heartbeat(leader_heartbeat("a", 5), Instant::now());

        let reply = JoinReply {
            success: true,
            term: Term::new(2),
            leader_id: Some(ServerId::new("b")),
            servers: vec![
                ServerInfo {
                    server_id: ServerId::new("a"),
                    address: "h:a".into(),
                    role: ServerRole::Follower,
                },
                ServerInfo {
                    server_id: ServerId::new("b"),
                    address: "h:b".into(),
                    role: ServerRole::Leader,
                },
            ],
            server_addresses: Vec::new(),
        };
        t.replica.handle_join_completed(Some(reply), Instant::now());

        assert_eq!(Term::new(5), t.replica.term_state.current_term());
        assert_eq!(ElectionStateSnapshot::FollowerNoLeader, t.replica.election_state.current_state());
        assert!(t.replica.election_timer.is_armed());
        assert!(t.replica.membership.peers().contains(&ServerId::new("b")));
    }

    #[tokio::test]
    async fn join_falls_through_seeds_and_introduces_itself_to_leader() {
        let t = test_replica("c", &[]);
        let accepted_by_b = JoinReply {
            success: true,
            term: Term::new(1),
            leader_id: Some(ServerId::new("a")),
            servers: vec![ServerInfo {
                server_id: ServerId::new("a"),
                address: "h:a".into(),
                role: ServerRole::Leader,
            }],
            server_addresses: Vec::new(),
        };
        {
            let mut replies = t.transport.join_replies.lock().unwrap();
            replies.insert("h:b".into(), Ok(accepted_by_b.clone()));
            replies.insert("h:a".into(), Ok(JoinReply { term: Term::new(2), ..accepted_by_b }));
        }
        let seeds = vec![
            PeerTarget {
                id: ServerId::new("x"),
                address: "h:x".into(),
            },
            PeerTarget {
                id: ServerId::new("b"),
                address: "h:b".into(),
            },
        ];

        let reply = join_network(test_logger(), t.transport.as_ref(), request("c"), seeds, Duration::from_millis(50))
            .await
            .expect("join should succeed");

        // Leader's reply wins.
        assert_eq!(Term::new(2), reply.term);
        assert_eq!(
            vec!["join:h:x", "join:h:b", "join:h:a"],
            *t.transport.calls.lock().unwrap()
        );
    }

    #[tokio::test]
    async fn join_with_no_reachable_seed_bootstraps() {
        let mut t = test_replica("a", &["b:h:b"]);
        t.replica.handle_start();
        let seeds = t.replica.membership.seed_peers().to_vec();

        let reply = join_network(test_logger(), t.transport.as_ref(), request("a"), seeds, Duration::from_millis(50)).await;
        assert!(reply.is_none());

        t.replica.handle_join_completed(reply, Instant::now());
        assert!(t.replica.election_state.is_leader());
    }
}
