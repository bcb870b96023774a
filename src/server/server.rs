use crate::actor::{ActorExited, WeakActorClient};
use crate::api::{OperationApplier, ReplicatedOperation};
use crate::grpc::replica_service_server::{ReplicaService, ReplicaServiceServer};
use crate::grpc::{
    ProtoHeartbeatReply, ProtoHeartbeatReq, ProtoJoinReply, ProtoJoinReq, ProtoNetworkStateReply,
    ProtoNetworkStateReq, ProtoReplicateReply, ProtoReplicateReq,
};
use crate::replica::{
    self, HeartbeatMessage, HeartbeatReply, JoinReply, JoinRequest, NetworkState, OperationRequest, ServerId,
    ServerRole, Term,
};
use crate::server::RpcServerShutdownSignal;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tonic::metadata::MetadataValue;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

/// Metadata key on GetNetworkState replies listing every known replica address, comma separated.
pub(crate) const REPLICAS_METADATA_KEY: &str = "replicas";

/// RpcServer is the type that implements the replica gRPC interface.
pub(crate) struct RpcServer {
    logger: slog::Logger,
    local_replica: WeakActorClient,
    applier: Arc<dyn OperationApplier>,
}

impl RpcServer {
    pub(crate) fn new(logger: slog::Logger, local_replica: WeakActorClient, applier: Arc<dyn OperationApplier>) -> Self {
        RpcServer {
            logger,
            local_replica,
            applier,
        }
    }

    pub(crate) async fn run(self, socket_addr: SocketAddr, shutdown_signal: RpcServerShutdownSignal) {
        let logger = self.logger.clone();
        slog::info!(logger, "Listening on '{:?}'", socket_addr);

        let result = Server::builder()
            .add_service(ReplicaServiceServer::new(self))
            .serve_with_shutdown(socket_addr, shutdown_signal)
            .await;

        match result {
            Ok(()) => slog::info!(logger, "Server run() has exited"),
            Err(e) => slog::error!(logger, "Server run() failed: {:?}", e),
        }
    }

    async fn handle_heartbeat(&self, rpc_request: ProtoHeartbeatReq) -> Result<ProtoHeartbeatReply, Status> {
        let app_input = Self::convert_heartbeat_input(rpc_request)?;
        let app_output = self.local_replica.heartbeat(app_input).await.map_err(unavailable)?;
        Ok(Self::convert_heartbeat_output(app_output))
    }

    fn convert_heartbeat_input(rpc_request: ProtoHeartbeatReq) -> Result<HeartbeatMessage, Status> {
        let server_id = required_server_id(rpc_request.server_id)?;
        let role = ServerRole::from_label(&rpc_request.role)
            .ok_or_else(|| Status::invalid_argument(format!("Unknown role '{}'", rpc_request.role)))?;

        Ok(HeartbeatMessage {
            server_id,
            term: Term::new(rpc_request.term),
            role,
            timestamp_millis: rpc_request.timestamp,
            servers: rpc_request
                .servers
                .into_iter()
                .map(replica::server_info_from_proto)
                .collect(),
        })
    }

    fn convert_heartbeat_output(app_output: HeartbeatReply) -> ProtoHeartbeatReply {
        ProtoHeartbeatReply {
            term: app_output.term.as_u64(),
            success: app_output.success,
            role: app_output
                .role
                .map(|role| role.as_label().to_string())
                .unwrap_or_default(),
        }
    }

    async fn handle_join_network(&self, rpc_request: ProtoJoinReq) -> Result<ProtoJoinReply, Status> {
        let server_id = required_server_id(rpc_request.server_id)?;
        if rpc_request.address.is_empty() {
            return Err(Status::invalid_argument("Missing address"));
        }

        let app_output = self
            .local_replica
            .join_network(JoinRequest {
                server_id,
                address: rpc_request.address,
            })
            .await
            .map_err(unavailable)?;

        Ok(Self::convert_join_output(app_output))
    }

    fn convert_join_output(app_output: JoinReply) -> ProtoJoinReply {
        ProtoJoinReply {
            success: app_output.success,
            term: app_output.term.as_u64(),
            leader_id: app_output.leader_id.map(ServerId::into_inner).unwrap_or_default(),
            servers: app_output.servers.iter().map(replica::server_info_to_proto).collect(),
            server_addresses: app_output
                .server_addresses
                .into_iter()
                .map(|(id, address)| (id.into_inner(), address))
                .collect(),
        }
    }

    async fn handle_replicate_operation(&self, rpc_request: ProtoReplicateReq) -> Result<ProtoReplicateReply, Status> {
        let request = OperationRequest {
            service_name: rpc_request.service_name,
            method_name: rpc_request.method_name,
            serialized_request: Bytes::from(rpc_request.serialized_request),
            operation_id: rpc_request.operation_id,
            server_id: required_server_id(rpc_request.server_id)?,
            term: Term::new(rpc_request.term),
        };
        let operation = ReplicatedOperation {
            service_name: request.service_name.clone(),
            method_name: request.method_name.clone(),
            serialized_request: request.serialized_request.clone(),
            operation_id: request.operation_id,
            leader_id: request.server_id.to_string(),
            term: request.term.as_u64(),
        };

        let app_output = self
            .local_replica
            .replicate_operation(request)
            .await
            .map_err(unavailable)?;
        if !app_output.accepted {
            return Ok(ProtoReplicateReply { success: false });
        }

        // Applying is storage work, so it happens here and not on the actor.
        let success = match self.applier.apply_replicated_operation(&operation).await {
            Ok(()) => true,
            Err(e) => {
                slog::warn!(self.logger, "Operation {} not applied: {}", operation.operation_id, e);
                false
            }
        };

        Ok(ProtoReplicateReply { success })
    }

    async fn handle_get_network_state(&self) -> Result<Response<ProtoNetworkStateReply>, Status> {
        let network_state = self.local_replica.network_state().await.map_err(unavailable)?;
        let replicas = replicas_metadata(&network_state);

        let mut response = Response::new(ProtoNetworkStateReply {
            servers: network_state.servers.iter().map(replica::server_info_to_proto).collect(),
            leader_id: network_state.leader_id.map(ServerId::into_inner).unwrap_or_default(),
            term: network_state.term.as_u64(),
        });
        match MetadataValue::from_str(&replicas) {
            Ok(value) => {
                response.metadata_mut().insert(REPLICAS_METADATA_KEY, value);
            }
            Err(e) => slog::warn!(self.logger, "Can't attach replicas metadata '{}': {:?}", replicas, e),
        }

        Ok(response)
    }
}

fn required_server_id(server_id: String) -> Result<ServerId, Status> {
    replica::non_empty_server_id(server_id).ok_or_else(|| Status::invalid_argument("Missing server_id"))
}

fn unavailable(_: ActorExited) -> Status {
    Status::unavailable("Server internal replica task has exited")
}

fn replicas_metadata(network_state: &NetworkState) -> String {
    network_state
        .servers
        .iter()
        .map(|server| server.address.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait::async_trait]
impl ReplicaService for RpcServer {
    async fn heartbeat(
        &self,
        rpc_request_wrapped: Request<ProtoHeartbeatReq>,
    ) -> Result<Response<ProtoHeartbeatReply>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);
        let rpc_result = self.handle_heartbeat(rpc_request).await;
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);

        rpc_result.map(Response::new)
    }

    async fn join_network(&self, rpc_request_wrapped: Request<ProtoJoinReq>) -> Result<Response<ProtoJoinReply>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);
        let rpc_result = self.handle_join_network(rpc_request).await;
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);

        rpc_result.map(Response::new)
    }

    async fn replicate_operation(
        &self,
        rpc_request_wrapped: Request<ProtoReplicateReq>,
    ) -> Result<Response<ProtoReplicateReply>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();

        slog::debug!(
            self.logger,
            "ServerWire - replicate {}.{} op {}",
            rpc_request.service_name,
            rpc_request.method_name,
            rpc_request.operation_id
        );
        let rpc_result = self.handle_replicate_operation(rpc_request).await;
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);

        rpc_result.map(Response::new)
    }

    async fn get_network_state(
        &self,
        rpc_request_wrapped: Request<ProtoNetworkStateReq>,
    ) -> Result<Response<ProtoNetworkStateReply>, Status> {
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request_wrapped.get_ref());
        self.handle_get_network_state().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replica::ServerInfo;

    #[test]
    fn heartbeat_input_validation() {
        let valid = ProtoHeartbeatReq {
            server_id: "a".to_string(),
            term: 3,
            role: "leader".to_string(),
            timestamp: 1,
            servers: Vec::new(),
        };
        let message = RpcServer::convert_heartbeat_input(valid.clone()).unwrap();
        assert_eq!(ServerRole::Leader, message.role);
        assert_eq!(Term::new(3), message.term);

        let bad_role = ProtoHeartbeatReq {
            role: "boss".to_string(),
            ..valid.clone()
        };
        assert_eq!(
            tonic::Code::InvalidArgument,
            RpcServer::convert_heartbeat_input(bad_role).unwrap_err().code()
        );

        let no_id = ProtoHeartbeatReq {
            server_id: String::new(),
            ..valid
        };
        assert!(RpcServer::convert_heartbeat_input(no_id).is_err());
    }

    #[test]
    fn replicas_metadata_lists_every_address() {
        let state = NetworkState {
            servers: vec![
                ServerInfo {
                    server_id: ServerId::new("a"),
                    address: "127.0.0.1:5001".into(),
                    role: ServerRole::Leader,
                },
                ServerInfo {
                    server_id: ServerId::new("b"),
                    address: "127.0.0.1:5002".into(),
                    role: ServerRole::Follower,
                },
            ],
            leader_id: Some(ServerId::new("a")),
            term: Term::new(1),
        };

        assert_eq!("127.0.0.1:5001,127.0.0.1:5002", replicas_metadata(&state));
    }
}
