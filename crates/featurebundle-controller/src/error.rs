//! Error types for the reconciliation engine.

use std::fmt;
use std::time::Duration;

use featurebundle_core::{CoreError, FeatureId};
use featurebundle_storage::StoreError;

/// Errors surfaced by a reconciliation pass.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Core(#[from] CoreError),

    /// A feature failed to deploy or undeploy.
    #[error("Feature {feature} failed: {source}")]
    Feature {
        feature: FeatureId,
        #[source]
        source: DeployError,
    },

    /// The status kept conflicting with concurrent writers.
    #[error("Status of {name} still conflicted after {attempts} attempts")]
    StatusWriteConflict { name: String, attempts: u32 },

    #[error("Reconciliation cancelled")]
    Cancelled,

    #[error("Reconciliation exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),

    /// The reconciliation task did not run to completion.
    #[error("Reconciliation aborted: {0}")]
    Aborted(String),
}

impl ReconcileError {
    pub fn feature(feature: FeatureId, source: DeployError) -> Self {
        Self::Feature { feature, source }
    }

    /// Returns `true` if the pass stopped because cancellation was requested
    /// or its deadline passed.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded(_))
    }

    pub fn is_conflict(&self) -> bool {
        match self {
            Self::StatusWriteConflict { .. } => true,
            Self::Store(err) => err.is_version_conflict(),
            _ => false,
        }
    }
}

/// Classification of a deployer failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeployErrorKind {
    /// The target cluster could not be reached.
    Unreachable,
    /// The target cluster refused the manifests.
    Rejected,
    Timeout,
    /// The target cluster no longer exists.
    ClusterNotFound,
    Internal,
}

impl DeployErrorKind {
    /// Label recorded as the failure reason of a feature summary.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unreachable => "ClusterUnreachable",
            Self::Rejected => "ManifestRejected",
            Self::Timeout => "DeployTimeout",
            Self::ClusterNotFound => "ClusterNotFound",
            Self::Internal => "InternalError",
        }
    }
}

impl fmt::Display for DeployErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error returned by a [`crate::Deployer`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct DeployError {
    pub kind: DeployErrorKind,
    pub message: String,
}

impl DeployError {
    pub fn new(kind: DeployErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(DeployErrorKind::Unreachable, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(DeployErrorKind::Rejected, message)
    }

    pub fn cluster_not_found(message: impl Into<String>) -> Self {
        Self::new(DeployErrorKind::ClusterNotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(DeployErrorKind::Internal, message)
    }

    pub fn is_cluster_not_found(&self) -> bool {
        self.kind == DeployErrorKind::ClusterNotFound
    }
}
