use halyard_compute::ComputeError;
use thiserror::Error;

use crate::{ApplianceError, OperationResult};

/// Errors that can occur during failover remediation.
#[derive(Debug, Error)]
pub enum Error<AE, CE>
where
    AE: ApplianceError,
    CE: ComputeError,
{
    /// Reading the appliance state failed.
    #[error("appliance: {0}")]
    Appliance(AE),

    /// A background update task panicked.
    #[error("background task failed: {0}")]
    BackgroundTask(#[from] tokio::task::JoinError),

    /// A compute query or update failed for good.
    #[error("compute: {0}")]
    Compute(CE),

    /// The failover configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// At least one forwarding rule could not be retargeted.
    #[error("failed to update forwarding rules: {}", failed_rules(.0))]
    ForwardingRules(Vec<OperationResult>),

    /// This instance is not among the group's VMs.
    #[error("instance {0} not found among the cluster VMs")]
    MyVmNotFound(String),

    /// No target instance resource points at this instance.
    #[error("no target instance found for {0}")]
    TargetInstanceNotFound(String),
}

fn failed_rules(results: &[OperationResult]) -> String {
    results
        .iter()
        .filter(|result| !result.is_ok())
        .map(|result| result.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
