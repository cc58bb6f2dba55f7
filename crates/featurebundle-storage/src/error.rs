//! Store error types for the resource store abstraction layer.

/// Errors that can occur during resource store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested resource was not found.
    #[error("Resource not found: {kind}/{name}")]
    NotFound {
        /// The kind of resource that was not found.
        kind: String,
        /// The name of the resource that was not found.
        name: String,
    },

    /// The resource was modified since it was read.
    #[error("Version conflict on {name}: expected {expected}, found {actual}")]
    VersionConflict {
        /// Name of the conflicting resource.
        name: String,
        /// The resource version the writer based its change on.
        expected: u64,
        /// The resource version currently stored.
        actual: u64,
    },

    /// The resource data is invalid.
    #[error("Invalid resource: {message}")]
    InvalidResource {
        /// Description of why the resource is invalid.
        message: String,
    },

    /// Failed to reach the storage backend.
    #[error("Connection error: {message}")]
    ConnectionError {
        /// Description of the connection error.
        message: String,
    },
}

impl StoreError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Creates a new `VersionConflict` error.
    #[must_use]
    pub fn version_conflict(name: impl Into<String>, expected: u64, actual: u64) -> Self {
        Self::VersionConflict {
            name: name.into(),
            expected,
            actual,
        }
    }

    /// Creates a new `InvalidResource` error.
    #[must_use]
    pub fn invalid_resource(message: impl Into<String>) -> Self {
        Self::InvalidResource {
            message: message.into(),
        }
    }

    /// Creates a new `ConnectionError` error.
    #[must_use]
    pub fn connection_error(message: impl Into<String>) -> Self {
        Self::ConnectionError {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is a version conflict error.
    #[must_use]
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}
