//! Error plumbing shared by compute backends

use std::error::Error;
use std::fmt::{self, Debug};

/// Marker trait for compute backend errors
pub trait ComputeError: Debug + Error + Send + Sync + 'static {
    /// Returns the kind of this error
    fn kind(&self) -> ComputeErrorKind;
}

/// The kind of compute backend error.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ComputeErrorKind {
    /// The instance, rule or resource does not exist.
    NotFound,

    /// The resource is busy with another operation; retrying may succeed.
    NotReady,

    /// Error reported by the cloud control plane.
    External,

    /// Other/unknown error
    Other,
}

impl ComputeErrorKind {
    /// Whether repeating the same request may succeed.
    ///
    /// Missing resources and requests the control plane rejected fail the
    /// same way every time.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::NotReady | Self::Other)
    }
}

impl fmt::Display for ComputeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_kinds_are_retryable() {
        assert!(ComputeErrorKind::NotReady.is_retryable());
        assert!(ComputeErrorKind::Other.is_retryable());
        assert!(!ComputeErrorKind::NotFound.is_retryable());
        assert!(!ComputeErrorKind::External.is_retryable());
    }
}
