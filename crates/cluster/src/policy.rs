use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::InstanceRecord;

/// A primary that has not refreshed its record for this long is expired.
pub const DEFAULT_PRIMARY_EXPIRY: Duration = Duration::from_secs(3 * 60);

/// Boxed error returned by pluggable collaborators.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Decides whether a persisted primary that the control plane no longer
/// reports should still be trusted.
pub trait ExpiryPolicy: Send + Sync + 'static {
    /// Whether `record` is stale at `now`.
    fn is_expired(&self, record: &InstanceRecord, now: DateTime<Utc>) -> bool;
}

/// Expires records whose `last_update` is older than `max_age`, or missing.
#[derive(Clone, Copy, Debug)]
pub struct LastUpdateExpiry {
    /// Maximum record age.
    pub max_age: Duration,
}

impl Default for LastUpdateExpiry {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_PRIMARY_EXPIRY,
        }
    }
}

impl ExpiryPolicy for LastUpdateExpiry {
    fn is_expired(&self, record: &InstanceRecord, now: DateTime<Utc>) -> bool {
        let Some(last_update) = record.last_update else {
            return true;
        };

        (now - last_update)
            .to_std()
            .is_ok_and(|age| age > self.max_age)
    }
}

/// Releases licenses held by instances that left the cluster.
#[async_trait]
pub trait LicenseRevoker: Send + Sync + 'static {
    /// Revokes the license of `record`.
    async fn revoke(&self, record: &InstanceRecord) -> Result<(), BoxError>;
}

/// Revoker for deployments without license pools.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopRevoker;

#[async_trait]
impl LicenseRevoker for NoopRevoker {
    async fn revoke(&self, record: &InstanceRecord) -> Result<(), BoxError> {
        debug!("no license to revoke for {}", record.instance_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeDelta;

    #[test]
    fn test_last_update_expiry() {
        let policy = LastUpdateExpiry::default();
        let now = Utc::now();

        let mut record = InstanceRecord::default();
        assert!(policy.is_expired(&record, now));

        record.last_update = Some(now - TimeDelta::seconds(30));
        assert!(!policy.is_expired(&record, now));

        record.last_update = Some(now - TimeDelta::minutes(10));
        assert!(policy.is_expired(&record, now));

        // Clock skew: a record from the future is fresh.
        record.last_update = Some(now + TimeDelta::seconds(30));
        assert!(!policy.is_expired(&record, now));
    }
}
