use std::convert::TryFrom;
use tokio::time::Duration;

/// Tuning knobs for a replica. Anything left `None` gets a default suited to a small LAN cluster.
#[derive(Clone, Debug, Default)]
pub struct ReplicaOptions {
    pub heartbeat_interval: Option<Duration>,
    pub election_min_timeout: Option<Duration>,
    pub election_max_timeout: Option<Duration>,
    pub max_missed_heartbeats: Option<u32>,
    pub vote_request_timeout: Option<Duration>,
    pub heartbeat_rpc_timeout: Option<Duration>,
    pub replicate_timeout: Option<Duration>,
    pub join_timeout: Option<Duration>,
    pub heartbeat_error_backoff: Option<Duration>,
}

#[derive(Clone, Debug)]
pub(super) struct ReplicaOptionsValidated {
    pub heartbeat_interval: Duration,
    pub election_min_timeout: Duration,
    pub election_max_timeout: Duration,
    pub max_missed_heartbeats: u32,
    pub vote_request_timeout: Duration,
    pub heartbeat_rpc_timeout: Duration,
    pub replicate_timeout: Duration,
    pub join_timeout: Duration,
    pub heartbeat_error_backoff: Duration,
}

impl ReplicaOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.heartbeat_interval >= self.election_min_timeout {
            return Err("Election minimum timeout must be greater than the heartbeat interval");
        }
        if self.election_min_timeout >= self.election_max_timeout {
            return Err("Election minimum timeout must be less than maximum timeout");
        }
        if self.heartbeat_rpc_timeout >= self.election_min_timeout {
            return Err("Heartbeat RPC timeout must be less than the election minimum timeout");
        }
        if self.max_missed_heartbeats == 0 {
            return Err("Missed heartbeat threshold must be at least 1");
        }

        Ok(())
    }
}

impl TryFrom<ReplicaOptions> for ReplicaOptionsValidated {
    type Error = &'static str;

    fn try_from(options: ReplicaOptions) -> Result<Self, Self::Error> {
        let values = ReplicaOptionsValidated {
            heartbeat_interval: options.heartbeat_interval.unwrap_or(Duration::from_secs(1)),
            election_min_timeout: options.election_min_timeout.unwrap_or(Duration::from_secs(3)),
            election_max_timeout: options.election_max_timeout.unwrap_or(Duration::from_secs(6)),
            max_missed_heartbeats: options.max_missed_heartbeats.unwrap_or(3),
            vote_request_timeout: options.vote_request_timeout.unwrap_or(Duration::from_secs(2)),
            heartbeat_rpc_timeout: options.heartbeat_rpc_timeout.unwrap_or(Duration::from_secs(1)),
            replicate_timeout: options.replicate_timeout.unwrap_or(Duration::from_secs(2)),
            join_timeout: options.join_timeout.unwrap_or(Duration::from_secs(5)),
            heartbeat_error_backoff: options.heartbeat_error_backoff.unwrap_or(Duration::from_secs(1)),
        };

        values.validate()?;
        Ok(values)
    }
}
