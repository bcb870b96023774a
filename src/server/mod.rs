mod server;
mod shutdown;

pub(crate) use server::RpcServer;
pub(crate) use server::REPLICAS_METADATA_KEY;
pub(crate) use shutdown::shutdown_signal;
pub(crate) use shutdown::RpcServerShutdownHandle;
pub(crate) use shutdown::RpcServerShutdownSignal;
