mod actor;
mod api;
mod failover;
mod replica;
mod server;
mod grpc {
    include!("../generated/replica.rs");
}

pub use api::try_create_replica_node;
pub use api::ApplyError;
pub use api::ElectionEvent;
pub use api::ElectionEventListener;
pub use api::FollowerEventData;
pub use api::NoOpApplier;
pub use api::OperationApplier;
pub use api::ReplicaConfig;
pub use api::ReplicaCreationError;
pub use api::ReplicaNode;
pub use api::ReplicaOptions;
pub use api::ReplicaShutDown;
pub use api::ReplicateError;
pub use api::ReplicatedOperation;
pub use failover::ChannelConnector;
pub use failover::FailoverClient;
pub use failover::FailoverError;
pub use failover::FailoverOptions;
pub use failover::ReplicaConnector;
pub use failover::ReplicaSet;
pub use replica::ClusterView;
pub use replica::OperationRecord;
pub use replica::ReplicationOutcome;
pub use replica::ServerRole;

// `crate::{root_mod}` holds no code, only `mod` and `pub use` statements. No `mod` is `pub`
// anywhere; public types are exported one by one from here.
