//! Store trait for the resource store abstraction layer.

use async_trait::async_trait;
use featurebundle_core::{BundleStatus, ClusterBundle, ClusterRef, ConfigObject, FeatureBundle, ObjectRef};

use crate::error::StoreError;

/// The trait every resource store backend must implement.
///
/// Implementations must be thread-safe (`Send + Sync`); many reconciliations
/// use the same store concurrently.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    // ==================== Control resources ====================

    /// Reads a control resource by name.
    ///
    /// Returns `None` if the resource does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues, not for missing resources.
    async fn get(&self, name: &str) -> Result<Option<ClusterBundle>, StoreError>;

    /// Reads the parent bundle a control resource belongs to.
    ///
    /// Returns `None` if the parent does not exist.
    async fn get_parent(&self, bundle: &ClusterBundle) -> Result<Option<FeatureBundle>, StoreError>;

    /// Replaces the full status of a control resource.
    ///
    /// The write only succeeds if the stored resource version still equals
    /// `expected_version`. Returns the resource as stored after the write.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the resource does not exist.
    /// Returns `StoreError::VersionConflict` if it was modified concurrently.
    async fn patch_status(
        &self,
        name: &str,
        status: &BundleStatus,
        expected_version: u64,
    ) -> Result<ClusterBundle, StoreError>;

    /// Replaces the finalizer list of a control resource.
    ///
    /// Same concurrency rules as [`ResourceStore::patch_status`]. Returns
    /// `None` when the write removed the last finalizer of a resource whose
    /// deletion was requested: the store deletes it at that point.
    async fn patch_finalizers(
        &self,
        name: &str,
        finalizers: &[String],
        expected_version: u64,
    ) -> Result<Option<ClusterBundle>, StoreError>;

    // ==================== Shared configuration ====================

    /// Reads a shared configuration object.
    ///
    /// Returns `None` if the object does not exist (yet).
    async fn get_config_object(&self, reference: &ObjectRef)
    -> Result<Option<ConfigObject>, StoreError>;

    // ==================== Target clusters ====================

    /// Returns whether the target cluster is still registered.
    async fn cluster_exists(&self, cluster: &ClusterRef) -> Result<bool, StoreError>;

    // ==================== Metadata ====================

    /// Returns the name of this backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}
