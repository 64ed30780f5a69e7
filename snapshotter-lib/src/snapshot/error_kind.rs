use core::fmt::{Display, Formatter};
use serde::{Deserialize, Serialize};

/// Classification of everything that can go wrong while capturing a snapshot.
///
/// The variant names are persisted verbatim in the `errors` map of an entity snapshot,
/// so renaming a variant changes the on-disk format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::IntoStaticStr)]
pub enum ErrorKind {
    /// Timeout, connection reset, or 5xx. Safe to retry.
    TransientNetworkError,

    /// Upstream rate limit (429, secondary limit, or exhausted quota).
    RateLimitExceeded,

    /// The looked-up resource does not exist or is not accessible (404/403/410).
    EntityUnavailable,

    /// The response body or headers did not have the expected shape.
    MalformedResponse,

    /// Any other non-success status.
    UpstreamError,

    /// Writing results to disk failed.
    PersistenceError,
}

impl ErrorKind {
    /// Whether a request that failed this way may succeed if simply repeated.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::TransientNetworkError | Self::RateLimitExceeded)
    }
}

/// A classified failure while capturing or persisting snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotError {
    kind: ErrorKind,
    message: String,
}

impl SnapshotError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransientNetworkError, message)
    }

    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedResponse, message)
    }

    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EntityUnavailable, message)
    }

    #[must_use]
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PersistenceError, message)
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for SnapshotError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl core::error::Error for SnapshotError {}
