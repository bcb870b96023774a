use crate::grpc::replica_service_client::ReplicaServiceClient;
use crate::grpc::{
    ProtoHeartbeatReply, ProtoHeartbeatReq, ProtoJoinReply, ProtoJoinReq, ProtoReplicateReq, ProtoServerInfo,
};
use crate::replica::local_state::Term;
use crate::replica::peers::{ServerId, ServerInfo, ServerRole};
use crate::replica::replica_api::{HeartbeatMessage, HeartbeatReply, JoinReply, JoinRequest, OperationRequest};
use std::collections::HashMap;
use std::error::Error;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Duration;
use tonic::codegen::http::uri;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Status};

/// PeerTransport is how the replica talks to other replicas. Every call carries its own timeout.
#[async_trait::async_trait]
pub(crate) trait PeerTransport: Send + Sync {
    async fn heartbeat(
        &self,
        address: &str,
        message: HeartbeatMessage,
        timeout: Duration,
    ) -> Result<HeartbeatReply, TransportError>;

    async fn join_network(
        &self,
        address: &str,
        request: JoinRequest,
        timeout: Duration,
    ) -> Result<JoinReply, TransportError>;

    async fn replicate_operation(
        &self,
        address: &str,
        request: OperationRequest,
        timeout: Duration,
    ) -> Result<bool, TransportError>;
}

#[derive(Clone, Debug, thiserror::Error)]
pub(crate) enum TransportError {
    #[error("Peer unavailable: {0}")]
    Unavailable(String),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("RPC failed: {0}")]
    Rpc(String),
}

impl TransportError {
    /// Connection-level failure. The caller should consider the peer down.
    pub(crate) fn is_unavailable(&self) -> bool {
        matches!(self, TransportError::Unavailable(_))
    }
}

impl From<Status> for TransportError {
    fn from(status: Status) -> Self {
        match status.code() {
            Code::Unavailable => TransportError::Unavailable(status.message().to_string()),
            // tonic surfaces broken connections as Unknown("transport error").
            Code::Unknown if status.message().contains("transport") => {
                TransportError::Unavailable(status.message().to_string())
            }
            Code::DeadlineExceeded => TransportError::Rpc(format!("deadline exceeded: {}", status.message())),
            _ => TransportError::Rpc(format!("{:?}: {}", status.code(), status.message())),
        }
    }
}

impl From<ConnectError> for TransportError {
    fn from(e: ConnectError) -> Self {
        match e {
            ConnectError::InvalidUri(e) => TransportError::Rpc(format!("invalid peer address: {}", e)),
            ConnectError::ConnectFailure(e) => TransportError::Unavailable(e.to_string()),
        }
    }
}

#[derive(Debug)]
pub(crate) enum ConnectError {
    InvalidUri(uri::InvalidUri),
    ConnectFailure(Box<dyn Error + Send + Sync>),
}

impl From<uri::InvalidUri> for ConnectError {
    fn from(e: uri::InvalidUri) -> Self {
        ConnectError::InvalidUri(e)
    }
}

impl From<tonic::transport::Error> for ConnectError {
    fn from(e: tonic::transport::Error) -> Self {
        ConnectError::ConnectFailure(e.into())
    }
}

pub(crate) async fn connect(address: &str) -> Result<ReplicaServiceClient<Channel>, ConnectError> {
    let endpoint = Endpoint::from_shared(format!("http://{}", address))?;
    let channel = endpoint.connect().await?;

    Ok(ReplicaServiceClient::new(channel))
}

/// GrpcPeerTransport keeps one client per peer address and reuses it across calls. A client that
/// saw a connection failure is evicted so the next call reconnects.
#[derive(Clone, Default)]
pub(crate) struct GrpcPeerTransport {
    clients: Arc<Mutex<HashMap<String, ReplicaServiceClient<Channel>>>>,
}

impl GrpcPeerTransport {
    pub(crate) fn new() -> Self {
        GrpcPeerTransport::default()
    }

    async fn client(&self, address: &str) -> Result<ReplicaServiceClient<Channel>, TransportError> {
        if let Some(client) = self.clients.lock().await.get(address) {
            return Ok(client.clone());
        }

        // Don't hold the lock while connecting. Two racing connects just means one gets dropped.
        let client = connect(address).await?;
        self.clients
            .lock()
            .await
            .entry(address.to_string())
            .or_insert(client.clone());

        Ok(client)
    }

    async fn evict(&self, address: &str) {
        self.clients.lock().await.remove(address);
    }

    async fn call<T, F, Fut>(&self, address: &str, timeout: Duration, f: F) -> Result<T, TransportError>
    where
        F: FnOnce(ReplicaServiceClient<Channel>) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let attempt = async {
            let client = self.client(address).await?;
            f(client).await
        };

        let result = match tokio::time::timeout(timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        };

        if let Err(TransportError::Unavailable(_)) | Err(TransportError::Timeout(_)) = &result {
            self.evict(address).await;
        }

        result
    }
}

#[async_trait::async_trait]
impl PeerTransport for GrpcPeerTransport {
    async fn heartbeat(
        &self,
        address: &str,
        message: HeartbeatMessage,
        timeout: Duration,
    ) -> Result<HeartbeatReply, TransportError> {
        let rpc_request = ProtoHeartbeatReq {
            server_id: message.server_id.into_inner(),
            term: message.term.as_u64(),
            role: message.role.as_label().to_string(),
            timestamp: message.timestamp_millis,
            servers: message.servers.iter().map(server_info_to_proto).collect(),
        };

        self.call(address, timeout, |mut client| async move {
            let rpc_reply = client.heartbeat(rpc_request).await?.into_inner();
            Ok(convert_heartbeat_reply(rpc_reply))
        })
        .await
    }

    async fn join_network(
        &self,
        address: &str,
        request: JoinRequest,
        timeout: Duration,
    ) -> Result<JoinReply, TransportError> {
        let rpc_request = ProtoJoinReq {
            server_id: request.server_id.into_inner(),
            address: request.address,
        };

        self.call(address, timeout, |mut client| async move {
            let rpc_reply = client.join_network(rpc_request).await?.into_inner();
            Ok(convert_join_reply(rpc_reply))
        })
        .await
    }

    async fn replicate_operation(
        &self,
        address: &str,
        request: OperationRequest,
        timeout: Duration,
    ) -> Result<bool, TransportError> {
        let rpc_request = ProtoReplicateReq {
            service_name: request.service_name,
            method_name: request.method_name,
            serialized_request: request.serialized_request.to_vec(),
            operation_id: request.operation_id,
            server_id: request.server_id.into_inner(),
            term: request.term.as_u64(),
        };

        self.call(address, timeout, |mut client| async move {
            let rpc_reply = client.replicate_operation(rpc_request).await?.into_inner();
            Ok(rpc_reply.success)
        })
        .await
    }
}

fn convert_heartbeat_reply(rpc_reply: ProtoHeartbeatReply) -> HeartbeatReply {
    HeartbeatReply {
        term: Term::new(rpc_reply.term),
        success: rpc_reply.success,
        role: ServerRole::from_label(&rpc_reply.role),
    }
}

fn convert_join_reply(rpc_reply: ProtoJoinReply) -> JoinReply {
    let mut server_addresses: Vec<(ServerId, String)> = rpc_reply
        .server_addresses
        .into_iter()
        .map(|(id, address)| (ServerId::new(id), address))
        .collect();
    // Proto maps are unordered. Sort so "first wins" is deterministic.
    server_addresses.sort();

    JoinReply {
        success: rpc_reply.success,
        term: Term::new(rpc_reply.term),
        leader_id: non_empty_server_id(rpc_reply.leader_id),
        servers: rpc_reply.servers.into_iter().map(server_info_from_proto).collect(),
        server_addresses,
    }
}

pub(crate) fn server_info_to_proto(info: &ServerInfo) -> ProtoServerInfo {
    ProtoServerInfo {
        server_id: info.server_id.as_str().to_string(),
        address: info.address.clone(),
        role: info.role.as_label().to_string(),
    }
}

/// Unknown role labels are read as follower, the most conservative assumption.
pub(crate) fn server_info_from_proto(proto: ProtoServerInfo) -> ServerInfo {
    ServerInfo {
        server_id: ServerId::new(proto.server_id),
        address: proto.address,
        role: ServerRole::from_label(&proto.role).unwrap_or(ServerRole::Follower),
    }
}

pub(crate) fn non_empty_server_id(id: String) -> Option<ServerId> {
    if id.is_empty() {
        None
    } else {
        Some(ServerId::new(id))
    }
}
