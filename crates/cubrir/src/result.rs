//! Result and error types for Cubrir.

use thiserror::Error;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that can occur while mutating a coverage registry
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Optimistic version check failed while applying an update
    ///
    /// The update was computed against `expected`, but another writer already
    /// advanced the registry to `actual`. The caller must re-fetch the
    /// registry state and recompute its update; the registry never retries on
    /// its own.
    #[error("concurrent instrumentation: update expected version {expected} but registry is at {actual}")]
    VersionConflict {
        /// Version the update was computed against
        expected: u64,
        /// Version the registry actually holds
        actual: u64,
    },

    /// Update applied to a merged, reporting-only registry
    ///
    /// Unlike a version conflict, retrying can never succeed.
    #[error("registry is read-only: merged registries support reporting only")]
    ReadOnlyRegistry,

    /// The update describes structure the registry cannot resolve
    #[error("structural inconsistency: {message}")]
    StructuralInconsistency {
        /// What could not be resolved
        message: String,
    },

    /// A context name is not present in the context store
    #[error("unknown coverage context: {name}")]
    UnknownContext {
        /// The missing context name
        name: String,
    },

    /// A context definition carried a pattern that does not compile
    #[error("invalid pattern for context {name}: {message}")]
    InvalidContextPattern {
        /// Context name the pattern was registered under
        name: String,
        /// Regex compile error
        message: String,
    },
}

impl RegistryError {
    /// Whether the caller can recover by recomputing its update
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}
