use bytes::Bytes;
use chat_replica::{
    ApplyError, ChannelConnector, ClusterView, FailoverClient, FailoverOptions, OperationApplier, ReplicaConfig,
    ReplicaNode, ReplicaOptions, ReplicaSet, ReplicateError, ReplicatedOperation, ServerRole,
};
use slog::Drain;
use std::collections::HashSet;
use std::error::Error;
use std::sync::{Arc, Mutex};
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bootstrap_and_join() -> Result<(), Box<dyn Error>> {
    let cluster = start_cluster(47110, fast_options(), Arc::new(RecordingApplier::default())).await?;
    let nodes = cluster.nodes();

    let views = wait_for_views(&nodes, Duration::from_secs(10), |views| {
        views.iter().all(|v| v.leader_id.as_deref() == Some("a")) && views.iter().all(|v| v.peers.len() == 2)
    })
    .await;

    assert_eq!(ServerRole::Leader, views[0].role);
    assert_eq!(ServerRole::Follower, views[1].role);
    assert_eq!(ServerRole::Follower, views[2].role);
    for view in views.iter() {
        let addresses: HashSet<_> = view.peers.values().collect();
        assert_eq!(view.peers.len(), addresses.len(), "Duplicate addresses in {:?}", view);
        assert!(!view.peers.contains_key(&view.server_id));
        assert!(!addresses.contains(&view.address));
        assert_eq!(views[0].term, view.term);
    }

    // Followers can't forward writes.
    match cluster.b.replicate_to_followers("ChatService", "SendMessage", Bytes::from("hi")).await {
        Err(ReplicateError::ForwardingUnavailable { leader_id }) => assert_eq!("a", leader_id),
        other => panic!("Expected forwarding error, got {:?}", other),
    }

    // A client that starts out pointed at a dead replica finds the live ones.
    let mut client = FailoverClient::new(
        create_root_logger_for_stdout().new(slog::o!("Client" => "failover")),
        ChannelConnector,
        ReplicaSet::new("127.0.0.1:47119", vec![cluster.c.address().to_string()]),
        FailoverOptions {
            base_delay: Duration::from_millis(50),
            call_timeout: Duration::from_secs(1),
            ..FailoverOptions::default()
        },
    );
    let known = client.discover(&CancellationToken::new()).await?;
    assert_eq!(Some(cluster.c.address()), client.current_replica());
    for node in nodes.iter() {
        assert!(known.iter().any(|a| a == node.address()), "{} missing from {:?}", node.address(), known);
    }

    cluster.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn leader_failure_triggers_reelection() -> Result<(), Box<dyn Error>> {
    let cluster = start_cluster(47120, fast_options(), Arc::new(RecordingApplier::default())).await?;

    let views = wait_for_views(&cluster.nodes(), Duration::from_secs(10), |views| {
        views.iter().all(|v| v.leader_id.as_deref() == Some("a"))
    })
    .await;
    let old_term = views[0].term;

    let Cluster { a, b, c } = cluster;
    a.shutdown().await;

    let survivors = [&b, &c];
    let views = wait_for_views(&survivors, Duration::from_secs(15), |views| {
        let leader = match views.iter().find(|v| v.role == ServerRole::Leader) {
            Some(leader) => leader,
            None => return false,
        };
        views
            .iter()
            .all(|v| v.leader_id.as_deref() == Some(leader.server_id.as_str()) && v.term == leader.term)
    })
    .await;

    assert!(views[0].term > old_term, "New term {} not above {}", views[0].term, old_term);

    b.shutdown().await;
    c.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn quorum_reached_then_shortfall() -> Result<(), Box<dyn Error>> {
    // Slow enough heartbeats that the leader hasn't evicted anyone when the second write goes out.
    let options = ReplicaOptions {
        heartbeat_interval: Some(Duration::from_secs(1)),
        election_min_timeout: Some(Duration::from_secs(4)),
        election_max_timeout: Some(Duration::from_secs(8)),
        ..fast_options()
    };
    let applier = Arc::new(RecordingApplier::default());
    let cluster = start_cluster(47130, options, applier.clone()).await?;
    wait_for_views(&cluster.nodes(), Duration::from_secs(10), |views| {
        views.iter().all(|v| v.leader_id.as_deref() == Some("a"))
    })
    .await;

    let outcome = cluster
        .a
        .replicate_to_followers("ChatService", "CreateRoom", Bytes::from("general"))
        .await?;
    assert_eq!(3, outcome.successes);
    assert_eq!(3, outcome.cluster_size);
    assert!(outcome.quorum_reached);

    let applied = applier.applied.lock().unwrap().clone();
    assert_eq!(2, applied.len());
    for operation in applied.iter() {
        assert_eq!(outcome.operation_id, operation.operation_id);
        assert_eq!("CreateRoom", operation.method_name);
        assert_eq!("a", operation.leader_id);
    }

    // The service layer reports what the write produced. Followers log the same id.
    assert!(
        cluster
            .a
            .record_operation_result(outcome.operation_id, Bytes::from("room-1"))
            .await?
    );
    let leader_log = cluster.a.operation_log().await?;
    assert_eq!(1, leader_log.len());
    assert_eq!(Some(Bytes::from("room-1")), leader_log[0].result);
    let follower_log = cluster.b.operation_log().await?;
    assert_eq!(1, follower_log.len());
    assert_eq!(outcome.operation_id, follower_log[0].operation_id);
    assert_eq!(Bytes::from("general"), follower_log[0].params);
    assert_eq!(None, follower_log[0].result);

    let Cluster { a, b, c } = cluster;
    b.shutdown().await;
    c.shutdown().await;

    let outcome = a
        .replicate_to_followers("ChatService", "SendMessage", Bytes::from("anyone?"))
        .await?;
    assert_eq!(1, outcome.successes);
    assert_eq!(3, outcome.cluster_size);
    assert!(!outcome.quorum_reached);

    let view = a.cluster_view().await?;
    assert_eq!(2, view.operation_count);
    assert_eq!(2, view.last_operation_id);

    a.shutdown().await;
    Ok(())
}

// ------- Helpers --------

struct Cluster {
    a: ReplicaNode,
    b: ReplicaNode,
    c: ReplicaNode,
}

impl Cluster {
    fn nodes(&self) -> [&ReplicaNode; 3] {
        [&self.a, &self.b, &self.c]
    }

    async fn shutdown(self) {
        self.a.shutdown().await;
        self.b.shutdown().await;
        self.c.shutdown().await;
    }
}

/// `a` bootstraps, `b` joins through `a` by id, `c` joins through a bare address.
async fn start_cluster(
    port_base: u16,
    options: ReplicaOptions,
    applier: Arc<RecordingApplier>,
) -> Result<Cluster, Box<dyn Error>> {
    let a_address = format!("127.0.0.1:{}", port_base);
    let mut a = create_node("a", &a_address, Vec::new(), options.clone(), applier.clone()).await?;
    let mut b = create_node(
        "b",
        &format!("127.0.0.1:{}", port_base + 1),
        vec![format!("a:{}", a_address)],
        options.clone(),
        applier.clone(),
    )
    .await?;
    let mut c = create_node(
        "c",
        &format!("127.0.0.1:{}", port_base + 2),
        vec![a_address.clone()],
        options,
        applier,
    )
    .await?;

    // Let the servers bind.
    sleep(Duration::from_millis(200)).await;

    a.start().await?;
    b.start().await?;
    c.start().await?;

    Ok(Cluster { a, b, c })
}

async fn create_node(
    server_id: &str,
    address: &str,
    seed_peers: Vec<String>,
    options: ReplicaOptions,
    applier: Arc<RecordingApplier>,
) -> Result<ReplicaNode, Box<dyn Error>> {
    let node = chat_replica::try_create_replica_node(ReplicaConfig {
        server_id: server_id.to_string(),
        address: address.to_string(),
        seed_peers,
        logger: create_root_logger_for_stdout(),
        options,
        applier,
    })
    .await?;

    Ok(node)
}

fn fast_options() -> ReplicaOptions {
    ReplicaOptions {
        heartbeat_interval: Some(Duration::from_millis(100)),
        election_min_timeout: Some(Duration::from_millis(600)),
        election_max_timeout: Some(Duration::from_millis(1200)),
        max_missed_heartbeats: Some(3),
        vote_request_timeout: Some(Duration::from_millis(300)),
        heartbeat_rpc_timeout: Some(Duration::from_millis(300)),
        replicate_timeout: Some(Duration::from_millis(500)),
        join_timeout: Some(Duration::from_secs(1)),
        heartbeat_error_backoff: Some(Duration::from_millis(100)),
    }
}

/// Poll every node's view until `done` holds for all of them together.
async fn wait_for_views<F>(nodes: &[&ReplicaNode], timeout: Duration, mut done: F) -> Vec<ClusterView>
where
    F: FnMut(&[ClusterView]) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        let mut views = Vec::with_capacity(nodes.len());
        for node in nodes {
            views.push(node.cluster_view().await.expect("Replica should be alive"));
        }
        if done(&views) {
            return views;
        }

        assert!(Instant::now() < deadline, "Timed out waiting for cluster. Last views: {:#?}", views);
        sleep(Duration::from_millis(50)).await;
    }
}

#[derive(Default)]
struct RecordingApplier {
    applied: Mutex<Vec<ReplicatedOperation>>,
}

#[async_trait::async_trait]
impl OperationApplier for RecordingApplier {
    async fn apply_replicated_operation(&self, operation: &ReplicatedOperation) -> Result<(), ApplyError> {
        self.applied.lock().unwrap().push(operation.clone());
        Ok(())
    }
}

/// The replica adds its own "ServerId" key, so the root logger carries none.
fn create_root_logger_for_stdout() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).use_file_location().build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!())
}

async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await;
}
