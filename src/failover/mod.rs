mod backoff;
mod client;
mod connector;
mod replica_set;

pub use client::FailoverClient;
pub use client::FailoverError;
pub use client::FailoverOptions;
pub use connector::ChannelConnector;
pub use connector::ReplicaConnector;
pub use replica_set::ReplicaSet;
