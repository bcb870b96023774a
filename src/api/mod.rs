//! Client-facing API of the replica: creating and driving a node, and the hooks an application
//! plugs into it.
mod applier;
mod event_bus;
mod node;
mod options;
mod wiring;

pub use applier::ApplyError;
pub use applier::NoOpApplier;
pub use applier::OperationApplier;
pub use applier::ReplicatedOperation;
pub use event_bus::ElectionEvent;
pub use event_bus::ElectionEventListener;
pub use event_bus::FollowerEventData;
pub use node::ReplicaNode;
pub use node::ReplicaShutDown;
pub use node::ReplicateError;
pub use options::ReplicaOptions;
pub use wiring::try_create_replica_node;
pub use wiring::ReplicaConfig;
pub use wiring::ReplicaCreationError;
