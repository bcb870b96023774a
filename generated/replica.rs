#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoServerInfo {
    #[prost(string, tag = "1")]
    pub server_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub address: ::prost::alloc::string::String,
    /// "leader", "follower" or "candidate"
    #[prost(string, tag = "3")]
    pub role: ::prost::alloc::string::String,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoHeartbeatReq {
    #[prost(string, tag = "1")]
    pub server_id: ::prost::alloc::string::String,
    #[prost(uint64, tag = "2")]
    pub term: u64,
    #[prost(string, tag = "3")]
    pub role: ::prost::alloc::string::String,
    /// Unix epoch millis of the sender.
    #[prost(int64, tag = "4")]
    pub timestamp: i64,
    /// Only populated by leaders. Followers learn about members they haven't met yet.
    #[prost(message, repeated, tag = "5")]
    pub servers: ::prost::alloc::vec::Vec<ProtoServerInfo>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoHeartbeatReply {
    #[prost(uint64, tag = "1")]
    pub term: u64,
    #[prost(bool, tag = "2")]
    pub success: bool,
    #[prost(string, tag = "3")]
    pub role: ::prost::alloc::string::String,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoJoinReq {
    #[prost(string, tag = "1")]
    pub server_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub address: ::prost::alloc::string::String,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoJoinReply {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(uint64, tag = "2")]
    pub term: u64,
    /// Empty when unknown.
    #[prost(string, tag = "3")]
    pub leader_id: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "4")]
    pub servers: ::prost::alloc::vec::Vec<ProtoServerInfo>,
    #[prost(map = "string, string", tag = "5")]
    pub server_addresses:
        ::std::collections::HashMap<::prost::alloc::string::String, ::prost::alloc::string::String>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoReplicateReq {
    #[prost(string, tag = "1")]
    pub service_name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub method_name: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "3")]
    pub serialized_request: ::prost::alloc::vec::Vec<u8>,
    #[prost(uint64, tag = "4")]
    pub operation_id: u64,
    #[prost(string, tag = "5")]
    pub server_id: ::prost::alloc::string::String,
    #[prost(uint64, tag = "6")]
    pub term: u64,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoReplicateReply {
    #[prost(bool, tag = "1")]
    pub success: bool,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoNetworkStateReq {
    #[prost(string, tag = "1")]
    pub server_id: ::prost::alloc::string::String,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoNetworkStateReply {
    #[prost(message, repeated, tag = "1")]
    pub servers: ::prost::alloc::vec::Vec<ProtoServerInfo>,
    #[prost(string, tag = "2")]
    pub leader_id: ::prost::alloc::string::String,
    #[prost(uint64, tag = "3")]
    pub term: u64,
}
#[doc = r" Generated client implementations."]
pub mod replica_service_client {
    #![allow(unused_variables, dead_code, missing_docs)]
    use tonic::codegen::*;
    #[doc = " Replica-to-replica coordination, plus the discovery call clients use for failover."]
    pub struct ReplicaServiceClient<T> {
        inner: tonic::client::Grpc<T>,
    }
    impl ReplicaServiceClient<tonic::transport::Channel> {
        #[doc = r" Attempt to create a new client by connecting to a given endpoint."]
        pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
        where
            D: std::convert::TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }
    impl<T> ReplicaServiceClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::ResponseBody: Body + HttpBody + Send + 'static,
        T::Error: Into<StdError>,
        <T::ResponseBody as HttpBody>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }
        pub fn with_interceptor(inner: T, interceptor: impl Into<tonic::Interceptor>) -> Self {
            let inner = tonic::client::Grpc::with_interceptor(inner, interceptor);
            Self { inner }
        }
        #[doc = " Liveness probe and leader announcement. A candidate sends the same message to ask for a vote."]
        pub async fn heartbeat(
            &mut self,
            request: impl tonic::IntoRequest<super::ProtoHeartbeatReq>,
        ) -> Result<tonic::Response<super::ProtoHeartbeatReply>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/replica.ReplicaService/Heartbeat");
            self.inner.unary(request.into_request(), path, codec).await
        }
        pub async fn join_network(
            &mut self,
            request: impl tonic::IntoRequest<super::ProtoJoinReq>,
        ) -> Result<tonic::Response<super::ProtoJoinReply>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/replica.ReplicaService/JoinNetwork");
            self.inner.unary(request.into_request(), path, codec).await
        }
        pub async fn replicate_operation(
            &mut self,
            request: impl tonic::IntoRequest<super::ProtoReplicateReq>,
        ) -> Result<tonic::Response<super::ProtoReplicateReply>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path =
                http::uri::PathAndQuery::from_static("/replica.ReplicaService/ReplicateOperation");
            self.inner.unary(request.into_request(), path, codec).await
        }
        pub async fn get_network_state(
            &mut self,
            request: impl tonic::IntoRequest<super::ProtoNetworkStateReq>,
        ) -> Result<tonic::Response<super::ProtoNetworkStateReply>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path =
                http::uri::PathAndQuery::from_static("/replica.ReplicaService/GetNetworkState");
            self.inner.unary(request.into_request(), path, codec).await
        }
    }
    impl<T: Clone> Clone for ReplicaServiceClient<T> {
        fn clone(&self) -> Self {
            Self {
                inner: self.inner.clone(),
            }
        }
    }
    impl<T> std::fmt::Debug for ReplicaServiceClient<T> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "ReplicaServiceClient {{ ... }}")
        }
    }
}
#[doc = r" Generated server implementations."]
pub mod replica_service_server {
    #![allow(unused_variables, dead_code, missing_docs)]
    use tonic::codegen::*;
    #[doc = "Generated trait containing gRPC methods that should be implemented for use with ReplicaServiceServer."]
    #[async_trait]
    pub trait ReplicaService: Send + Sync + 'static {
        #[doc = " Liveness probe and leader announcement. A candidate sends the same message to ask for a vote."]
        async fn heartbeat(
            &self,
            request: tonic::Request<super::ProtoHeartbeatReq>,
        ) -> Result<tonic::Response<super::ProtoHeartbeatReply>, tonic::Status>;
        async fn join_network(
            &self,
            request: tonic::Request<super::ProtoJoinReq>,
        ) -> Result<tonic::Response<super::ProtoJoinReply>, tonic::Status>;
        async fn replicate_operation(
            &self,
            request: tonic::Request<super::ProtoReplicateReq>,
        ) -> Result<tonic::Response<super::ProtoReplicateReply>, tonic::Status>;
        async fn get_network_state(
            &self,
            request: tonic::Request<super::ProtoNetworkStateReq>,
        ) -> Result<tonic::Response<super::ProtoNetworkStateReply>, tonic::Status>;
    }
    #[doc = " Replica-to-replica coordination, plus the discovery call clients use for failover."]
    #[derive(Debug)]
    pub struct ReplicaServiceServer<T: ReplicaService> {
        inner: _Inner<T>,
    }
    struct _Inner<T>(Arc<T>, Option<tonic::Interceptor>);
    impl<T: ReplicaService> ReplicaServiceServer<T> {
        pub fn new(inner: T) -> Self {
            let inner = Arc::new(inner);
            let inner = _Inner(inner, None);
            Self { inner }
        }
        pub fn with_interceptor(inner: T, interceptor: impl Into<tonic::Interceptor>) -> Self {
            let inner = Arc::new(inner);
            let inner = _Inner(inner, Some(interceptor.into()));
            Self { inner }
        }
    }
    impl<T, B> Service<http::Request<B>> for ReplicaServiceServer<T>
    where
        T: ReplicaService,
        B: HttpBody + Send + Sync + 'static,
        B::Error: Into<StdError> + Send + 'static,
    {
        type Response = http::Response<tonic::body::BoxBody>;
        type Error = Never;
        type Future = BoxFuture<Self::Response, Self::Error>;
        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
        fn call(&mut self, req: http::Request<B>) -> Self::Future {
            let inner = self.inner.clone();
            match req.uri().path() {
                "/replica.ReplicaService/Heartbeat" => {
                    #[allow(non_camel_case_types)]
                    struct HeartbeatSvc<T: ReplicaService>(pub Arc<T>);
                    impl<T: ReplicaService> tonic::server::UnaryService<super::ProtoHeartbeatReq> for HeartbeatSvc<T> {
                        type Response = super::ProtoHeartbeatReply;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::ProtoHeartbeatReq>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).heartbeat(request).await };
                            Box::pin(fut)
                        }
                    }
                    let inner = self.inner.clone();
                    let fut = async move {
                        let interceptor = inner.1.clone();
                        let inner = inner.0;
                        let method = HeartbeatSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = if let Some(interceptor) = interceptor {
                            tonic::server::Grpc::with_interceptor(codec, interceptor)
                        } else {
                            tonic::server::Grpc::new(codec)
                        };
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                "/replica.ReplicaService/JoinNetwork" => {
                    #[allow(non_camel_case_types)]
                    struct JoinNetworkSvc<T: ReplicaService>(pub Arc<T>);
                    impl<T: ReplicaService> tonic::server::UnaryService<super::ProtoJoinReq> for JoinNetworkSvc<T> {
                        type Response = super::ProtoJoinReply;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::ProtoJoinReq>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).join_network(request).await };
                            Box::pin(fut)
                        }
                    }
                    let inner = self.inner.clone();
                    let fut = async move {
                        let interceptor = inner.1.clone();
                        let inner = inner.0;
                        let method = JoinNetworkSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = if let Some(interceptor) = interceptor {
                            tonic::server::Grpc::with_interceptor(codec, interceptor)
                        } else {
                            tonic::server::Grpc::new(codec)
                        };
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                "/replica.ReplicaService/ReplicateOperation" => {
                    #[allow(non_camel_case_types)]
                    struct ReplicateOperationSvc<T: ReplicaService>(pub Arc<T>);
                    impl<T: ReplicaService> tonic::server::UnaryService<super::ProtoReplicateReq>
                        for ReplicateOperationSvc<T>
                    {
                        type Response = super::ProtoReplicateReply;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::ProtoReplicateReq>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).replicate_operation(request).await };
                            Box::pin(fut)
                        }
                    }
                    let inner = self.inner.clone();
                    let fut = async move {
                        let interceptor = inner.1.clone();
                        let inner = inner.0;
                        let method = ReplicateOperationSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = if let Some(interceptor) = interceptor {
                            tonic::server::Grpc::with_interceptor(codec, interceptor)
                        } else {
                            tonic::server::Grpc::new(codec)
                        };
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                "/replica.ReplicaService/GetNetworkState" => {
                    #[allow(non_camel_case_types)]
                    struct GetNetworkStateSvc<T: ReplicaService>(pub Arc<T>);
                    impl<T: ReplicaService> tonic::server::UnaryService<super::ProtoNetworkStateReq>
                        for GetNetworkStateSvc<T>
                    {
                        type Response = super::ProtoNetworkStateReply;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::ProtoNetworkStateReq>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).get_network_state(request).await };
                            Box::pin(fut)
                        }
                    }
                    let inner = self.inner.clone();
                    let fut = async move {
                        let interceptor = inner.1.clone();
                        let inner = inner.0;
                        let method = GetNetworkStateSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = if let Some(interceptor) = interceptor {
                            tonic::server::Grpc::with_interceptor(codec, interceptor)
                        } else {
                            tonic::server::Grpc::new(codec)
                        };
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                _ => Box::pin(async move {
                    Ok(http::Response::builder()
                        .status(200)
                        .header("grpc-status", "12")
                        .header("content-type", "application/grpc")
                        .body(tonic::body::BoxBody::empty())
                        .unwrap())
                }),
            }
        }
    }
    impl<T: ReplicaService> Clone for ReplicaServiceServer<T> {
        fn clone(&self) -> Self {
            let inner = self.inner.clone();
            Self { inner }
        }
    }
    impl<T: ReplicaService> Clone for _Inner<T> {
        fn clone(&self) -> Self {
            Self(self.0.clone(), self.1.clone())
        }
    }
    impl<T: std::fmt::Debug> std::fmt::Debug for _Inner<T> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self.0)
        }
    }
    impl<T: ReplicaService> tonic::transport::NamedService for ReplicaServiceServer<T> {
        const NAME: &'static str = "replica.ReplicaService";
    }
}
