use chat_replica::{NoOpApplier, ReplicaConfig, ReplicaOptions};
use slog::Drain;
use std::env;
use std::error::Error;
use std::sync::Arc;

/// Runs a single replica until ctrl-c. Configured through the environment:
/// `REPLICA_ID`, `REPLICA_ADDR` and optionally `REPLICA_PEERS` (comma separated seeds).
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let server_id = env::var("REPLICA_ID").unwrap_or_else(|_| "replica-1".to_string());
    let address = env::var("REPLICA_ADDR").unwrap_or_else(|_| "127.0.0.1:5001".to_string());
    let seed_peers = env::var("REPLICA_PEERS")
        .map(|peers| parse_peers(&peers))
        .unwrap_or_default();

    let logger = create_root_logger_for_stdout();
    slog::info!(logger, "Starting {} at {} with seeds {:?}", server_id, address, seed_peers);

    let mut node = chat_replica::try_create_replica_node(ReplicaConfig {
        server_id,
        address,
        seed_peers,
        logger: logger.clone(),
        options: ReplicaOptions::default(),
        applier: Arc::new(NoOpApplier),
    })
    .await?;
    node.start().await?;

    tokio::signal::ctrl_c().await?;
    slog::info!(logger, "Received ctrl-c");
    node.shutdown().await;

    Ok(())
}

fn parse_peers(peers: &str) -> Vec<String> {
    peers
        .split(',')
        .map(str::trim)
        .filter(|peer| !peer.is_empty())
        .map(str::to_string)
        .collect()
}

fn create_root_logger_for_stdout() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!())
}
