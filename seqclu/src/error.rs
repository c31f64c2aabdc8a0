//! Error types shared across the crate.

/// Errors produced by the clustering engine.
///
/// There is no retry policy and no rollback: an [`SeqCluError::Invariant`] returned
/// from a mutating method leaves that method's partial mutation in place.
#[derive(Debug, thiserror::Error)]
pub enum SeqCluError {
    /// A [`crate::config::Config`] value failed validation at construction time.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// An internal invariant was violated. These indicate a bug in the engine or in a
    /// host-supplied trait implementation, not a recoverable runtime condition.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SeqCluError>;
