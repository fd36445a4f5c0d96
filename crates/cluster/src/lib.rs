//! Cluster membership for HA appliance groups on Google Cloud.
//!
//! A pass goes: reconcile live inventory with persisted records, elect the
//! primary, then transition roles (provision the instance's channels and
//! demote stale primaries in the background). `GceProvider` bundles those
//! steps with message exchange and backup storage into one session object.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod election;
mod error;
mod policy;
mod provider;
mod reconcile;
mod record;
mod store;
mod transition;

pub use election::elect_primary;
pub use error::{Error, Result};
pub use policy::{
    BoxError, DEFAULT_PRIMARY_EXPIRY, ExpiryPolicy, LastUpdateExpiry, LicenseRevoker, NoopRevoker,
};
pub use provider::{
    DEFAULT_MAX_BACKUPS, DEFAULT_PRIMARY_LABEL, GceProvider, GceProviderOptions, ProviderConfig,
};
pub use reconcile::{ExternalTag, ReconcileOptions, Reconciler};
pub use record::{InstanceRecord, PrimaryStatus, PrimaryStatusKind};
pub use store::ClusterStore;
pub use transition::{
    ChannelReport, TransitionHandle, TransitionManager, TransitionReport,
    demote_stale_primaries, tag_primary_instance,
};
