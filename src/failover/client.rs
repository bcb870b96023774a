use crate::failover::backoff::Backoff;
use crate::failover::connector::{ChannelConnector, ReplicaConnector};
use crate::failover::replica_set::ReplicaSet;
use crate::grpc::replica_service_client::ReplicaServiceClient;
use crate::grpc::ProtoNetworkStateReq;
use crate::server::REPLICAS_METADATA_KEY;
use std::future::Future;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tonic::{Code, Response, Status};

#[derive(Clone, Debug)]
pub struct FailoverOptions {
    /// Retries after the first attempt, so a call makes at most `max_retries + 1` attempts.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Deadline for a single attempt.
    pub call_timeout: Duration,
}

impl Default for FailoverOptions {
    fn default() -> Self {
        FailoverOptions {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            call_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FailoverError {
    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: Status },
    /// The replica answered with a status that trying elsewhere won't fix.
    #[error("Replica returned an error: {0}")]
    Rpc(Status),
    #[error("Call was cancelled")]
    Cancelled,
    #[error("No replicas to call")]
    NoReplicas,
}

/// FailoverClient sends calls to one replica at a time and moves on to another when the current
/// one can't be reached, backing off between attempts.
pub struct FailoverClient<C: ReplicaConnector> {
    logger: slog::Logger,
    connector: C,
    options: FailoverOptions,
    replicas: ReplicaSet,
    // Client for the replica it was opened against.
    connection: Option<(String, C::Client)>,
}

impl<C: ReplicaConnector> FailoverClient<C> {
    pub fn new(logger: slog::Logger, connector: C, replicas: ReplicaSet, options: FailoverOptions) -> Self {
        FailoverClient {
            logger,
            connector,
            options,
            replicas,
            connection: None,
        }
    }

    pub fn replicas(&self) -> &ReplicaSet {
        &self.replicas
    }

    pub fn current_replica(&self) -> Option<&str> {
        self.replicas.current()
    }

    /// Run `rpc` against the current replica, failing over and retrying on transport failures.
    /// Any other status is returned straight away.
    pub async fn call<T, F, Fut>(&mut self, cancel: &CancellationToken, mut rpc: F) -> Result<Response<T>, FailoverError>
    where
        F: FnMut(C::Client) -> Fut,
        Fut: Future<Output = Result<Response<T>, Status>>,
    {
        let max_attempts = self.options.max_retries + 1;
        let mut backoff = Backoff::new(self.options.base_delay, self.options.max_delay);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = backoff.next_delay();
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(FailoverError::Cancelled),
                }
            }
            if cancel.is_cancelled() {
                return Err(FailoverError::Cancelled);
            }

            let (address, client) = self.connect_current().await?;
            let result = match client {
                Ok(client) => match tokio::time::timeout(self.options.call_timeout, rpc(client)).await {
                    Ok(result) => result,
                    Err(_) => Err(Status::deadline_exceeded(format!(
                        "No reply from {} within {:?}",
                        address, self.options.call_timeout
                    ))),
                },
                Err(status) => Err(status),
            };

            match result {
                Ok(response) => {
                    self.replicas.record_success();
                    self.refresh_replicas(&response);
                    return Ok(response);
                }
                Err(status) if is_retryable(&status) => {
                    slog::warn!(
                        self.logger,
                        "Attempt {}/{} against {} failed: {}",
                        attempt,
                        max_attempts,
                        address,
                        status
                    );
                    last_error = Some(status);
                    if self.replicas.fail_over() {
                        slog::info!(self.logger, "Failing over from {} to {:?}", address, self.replicas.current());
                    }
                }
                Err(status) => return Err(FailoverError::Rpc(status)),
            }
        }

        Err(FailoverError::RetriesExhausted {
            attempts: max_attempts,
            last_error: last_error.unwrap_or_else(|| Status::unavailable("No attempt was made")),
        })
    }

    /// Client for the current replica, reusing the open one unless the target changed. A connect
    /// failure comes back as the inner `Err` so it's retried like a failed call.
    async fn connect_current(&mut self) -> Result<(String, Result<C::Client, Status>), FailoverError> {
        let address = self.replicas.current().ok_or(FailoverError::NoReplicas)?.to_string();

        if let Some((connected_to, client)) = &self.connection {
            if *connected_to == address {
                return Ok((address, Ok(client.clone())));
            }
        }

        self.connection = None;
        match self.connector.connect(&address).await {
            Ok(client) => {
                self.connection = Some((address.clone(), client.clone()));
                Ok((address, Ok(client)))
            }
            Err(status) => Ok((address, Err(Status::unavailable(status.message().to_string())))),
        }
    }

    fn refresh_replicas<T>(&mut self, response: &Response<T>) {
        let replicas = match response.metadata().get(REPLICAS_METADATA_KEY) {
            Some(value) => value,
            None => return,
        };

        match replicas.to_str() {
            Ok(replicas) => {
                self.replicas.refresh(replicas.split(',').map(str::trim));
                slog::debug!(self.logger, "Known replicas: {:?}", self.replicas.addresses());
            }
            Err(e) => slog::warn!(self.logger, "Ignoring malformed replicas metadata: {:?}", e),
        }
    }
}

impl FailoverClient<ChannelConnector> {
    /// Ask the cluster who's in it and add every member to the known set. Returns the addresses
    /// now known.
    pub async fn discover(&mut self, cancel: &CancellationToken) -> Result<Vec<String>, FailoverError> {
        let response = self
            .call(cancel, |channel| async move {
                ReplicaServiceClient::new(channel)
                    .get_network_state(ProtoNetworkStateReq {
                        server_id: String::new(),
                    })
                    .await
            })
            .await?;

        for server in response.into_inner().servers {
            self.replicas.add(server.address);
        }

        Ok(self.replicas.addresses().to_vec())
    }
}

/// Whether the status means "this replica can't serve you, try another one".
fn is_retryable(status: &Status) -> bool {
    match status.code() {
        Code::Unavailable | Code::DeadlineExceeded | Code::FailedPrecondition => true,
        // tonic reports a broken connection as Unknown.
        Code::Unknown => status.message().contains("transport"),
        _ => false,
    }
}
