use thiserror::Error;

/// Classified failure kinds for the airspace cache.
///
/// Most call sites propagate `anyhow::Result`; this enum travels inside the
/// `anyhow::Error` chain so boundaries that need to branch on the kind
/// (retry loops, the render facade) can recover it with `downcast_ref`.
#[derive(Debug, Error)]
pub enum AirspaceError {
    /// Transient transport failure. Eligible for retry with backoff.
    #[error("network error: {0}")]
    Network(String),

    /// The response or a feature does not match the expected wire format.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Invalid coordinates, malformed blob, or a ring with fewer than
    /// three points. Quarantined per-geometry, never fails a batch.
    #[error("corrupt geometry: {0}")]
    CorruptGeometry(String),

    /// Database open or write failure.
    #[error("store error: {0}")]
    Store(String),

    /// The on-disk schema version does not match this build. Pre-release
    /// policy is to delete the file and recreate it.
    #[error("schema version mismatch: found {found}, expected {expected}")]
    SchemaVersionMismatch { found: i32, expected: i32 },

    /// Cooperative cancellation. Treated as a non-failure by callers.
    #[error("operation cancelled")]
    Cancelled,
}

impl AirspaceError {
    /// True if the error chain bottoms out in a cancellation.
    pub fn is_cancellation(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<AirspaceError>(),
            Some(AirspaceError::Cancelled)
        )
    }

    /// True if the error chain is a transient network failure worth retrying.
    pub fn is_network(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<AirspaceError>(),
            Some(AirspaceError::Network(_))
        )
    }
}
