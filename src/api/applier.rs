use bytes::Bytes;

/// A write operation a leader replicated to this replica.
#[derive(Clone, Debug)]
pub struct ReplicatedOperation {
    pub service_name: String,
    pub method_name: String,
    pub serialized_request: Bytes,
    pub operation_id: u64,
    pub leader_id: String,
    pub term: u64,
}

#[derive(Debug, thiserror::Error)]
#[error("Failed to apply replicated operation: {0}")]
pub struct ApplyError(pub String);

/// OperationApplier is the application's storage layer as seen by the replica. The replica calls
/// it for every operation a leader replicates here. Writes made locally on the leader are the
/// caller's to apply.
#[async_trait::async_trait]
pub trait OperationApplier: Send + Sync + 'static {
    async fn apply_replicated_operation(&self, operation: &ReplicatedOperation) -> Result<(), ApplyError>;
}

/// Accepts everything and stores nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpApplier;

#[async_trait::async_trait]
impl OperationApplier for NoOpApplier {
    async fn apply_replicated_operation(&self, _operation: &ReplicatedOperation) -> Result<(), ApplyError> {
        Ok(())
    }
}
