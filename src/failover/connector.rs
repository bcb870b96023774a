use tonic::transport::{Channel, Endpoint};
use tonic::Status;

/// ReplicaConnector opens a client to one replica. The failover loop only reconnects when it
/// switches replicas, so a client may be reused for many calls.
#[async_trait::async_trait]
pub trait ReplicaConnector: Send + Sync {
    type Client: Clone + Send + 'static;

    async fn connect(&self, address: &str) -> Result<Self::Client, Status>;
}

/// Connects plain tonic channels. Wrap the channel in whichever generated client you need.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChannelConnector;

#[async_trait::async_trait]
impl ReplicaConnector for ChannelConnector {
    type Client = Channel;

    async fn connect(&self, address: &str) -> Result<Channel, Status> {
        let endpoint = Endpoint::from_shared(format!("http://{}", address))
            .map_err(|e| Status::invalid_argument(format!("Invalid replica address '{}': {}", address, e)))?;

        endpoint
            .connect()
            .await
            .map_err(|e| Status::unavailable(format!("Can't connect to {}: {}", address, e)))
    }
}
