//! Per-pass wrapper around one control resource.
//!
//! Every status and finalizer change of a reconciliation pass goes through a
//! [`StatusScope`]; [`StatusScope::close`] writes them back in one go.

use featurebundle_core::{
    BUNDLE_FINALIZER, BundleSpec, ClusterBundle, ClusterRef, FeatureId, FeatureStatus,
    FeatureSummary, ResourceKind,
};
use featurebundle_storage::{DynStore, StoreError};
use tracing::{debug, warn};

use crate::error::ReconcileError;

pub struct StatusScope {
    store: DynStore,
    bundle: ClusterBundle,
    /// Finalizers as last seen in the store.
    persisted_finalizers: Vec<String>,
    write_retries: u32,
    /// Set once the store no longer holds the resource.
    gone: bool,
}

impl StatusScope {
    pub fn new(store: DynStore, bundle: ClusterBundle) -> Self {
        let persisted_finalizers = bundle.metadata.finalizers.clone();
        Self {
            store,
            bundle,
            persisted_finalizers,
            write_retries: 3,
            gone: false,
        }
    }

    /// Number of re-read-and-retry rounds after a version conflict.
    pub fn with_write_retries(mut self, retries: u32) -> Self {
        self.write_retries = retries;
        self
    }

    pub fn name(&self) -> &str {
        self.bundle.name()
    }

    pub fn spec(&self) -> &BundleSpec {
        &self.bundle.spec.bundle
    }

    pub fn cluster(&self) -> &ClusterRef {
        &self.bundle.spec.cluster
    }

    pub fn is_deleting(&self) -> bool {
        self.bundle.is_deleting()
    }

    // ==================== Feature summaries ====================

    pub fn feature_summary(&self, feature: FeatureId) -> Option<&FeatureSummary> {
        self.bundle.status.feature_summary(feature)
    }

    pub fn feature_summaries(&self) -> &[FeatureSummary] {
        &self.bundle.status.feature_summaries
    }

    /// First summary for `feature`, created if missing.
    fn summary_mut(&mut self, feature: FeatureId) -> &mut FeatureSummary {
        let summaries = &mut self.bundle.status.feature_summaries;
        let idx = match summaries.iter().position(|fs| fs.feature_id == feature) {
            Some(idx) => idx,
            None => {
                summaries.push(FeatureSummary::new(feature, FeatureStatus::Provisioning));
                summaries.len() - 1
            }
        };
        &mut summaries[idx]
    }

    pub fn set_feature_status(&mut self, feature: FeatureId, status: FeatureStatus, hash: Vec<u8>) {
        let summary = self.summary_mut(feature);
        summary.status = status;
        summary.hash = hash;
    }

    pub fn set_failure_message(&mut self, feature: FeatureId, message: Option<String>) {
        self.summary_mut(feature).failure_message = message;
    }

    pub fn set_failure_reason(&mut self, feature: FeatureId, reason: Option<String>) {
        self.summary_mut(feature).failure_reason = reason;
    }

    /// Records the kinds deployed for `feature`, as `Kind.version.group`.
    pub fn set_deployed_kinds(&mut self, feature: FeatureId, kinds: &[ResourceKind]) {
        self.summary_mut(feature).deployed_kinds = kinds.iter().map(ToString::to_string).collect();
    }

    /// Drops every summary of `feature`. Returns `true` if one existed.
    pub fn remove_feature_summary(&mut self, feature: FeatureId) -> bool {
        let summaries = &mut self.bundle.status.feature_summaries;
        let before = summaries.len();
        summaries.retain(|fs| fs.feature_id != feature);
        before != summaries.len()
    }

    // ==================== Policy prefix ====================

    pub fn policy_prefix(&self) -> Option<&str> {
        self.bundle.status.policy_prefix.as_deref()
    }

    pub fn set_policy_prefix(&mut self, prefix: impl Into<String>) {
        self.bundle.status.policy_prefix = Some(prefix.into());
    }

    // ==================== Finalizer ====================

    pub fn has_finalizer(&self) -> bool {
        self.bundle.has_finalizer(BUNDLE_FINALIZER)
    }

    pub fn add_finalizer(&mut self) -> bool {
        self.bundle.add_finalizer(BUNDLE_FINALIZER)
    }

    pub fn remove_finalizer(&mut self) -> bool {
        self.bundle.remove_finalizer(BUNDLE_FINALIZER)
    }

    // ==================== Persistence ====================

    /// Writes the current status and finalizers now, keeping the scope open.
    pub async fn patch_object(&mut self) -> Result<(), ReconcileError> {
        self.persist().await
    }

    /// Writes the status and any finalizer change back to the store.
    pub async fn close(mut self) -> Result<(), ReconcileError> {
        self.persist().await
    }

    async fn persist(&mut self) -> Result<(), ReconcileError> {
        let mut attempts = 0u32;
        while !self.gone {
            attempts += 1;
            match self.write_once().await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_not_found() => {
                    debug!(bundle = %self.name(), "Resource gone; nothing to persist");
                    self.gone = true;
                }
                Err(err) if err.is_version_conflict() => {
                    if attempts > self.write_retries {
                        warn!(bundle = %self.name(), attempts, "Giving up on conflicting status write");
                        return Err(ReconcileError::StatusWriteConflict {
                            name: self.name().to_string(),
                            attempts,
                        });
                    }
                    debug!(bundle = %self.name(), attempts, error = %err, "Status write conflicted; re-reading");
                    self.refresh().await?;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    async fn write_once(&mut self) -> Result<(), StoreError> {
        let name = self.bundle.metadata.name.clone();
        let stored = self
            .store
            .patch_status(&name, &self.bundle.status, self.bundle.metadata.resource_version)
            .await?;
        self.bundle.metadata.resource_version = stored.metadata.resource_version;

        if self.bundle.metadata.finalizers != self.persisted_finalizers {
            let finalizers = self.bundle.metadata.finalizers.clone();
            match self
                .store
                .patch_finalizers(&name, &finalizers, self.bundle.metadata.resource_version)
                .await?
            {
                Some(stored) => {
                    self.bundle.metadata.resource_version = stored.metadata.resource_version;
                }
                None => {
                    debug!(bundle = %name, "Last finalizer removed; resource deleted");
                    self.gone = true;
                }
            }
            self.persisted_finalizers = finalizers;
        }
        Ok(())
    }

    /// Re-reads the stored resource and replays our finalizer changes on top
    /// of it. Our status replaces the stored one on the next write.
    async fn refresh(&mut self) -> Result<(), ReconcileError> {
        let Some(fresh) = self.store.get(self.name()).await? else {
            self.gone = true;
            return Ok(());
        };

        let ours = &self.bundle.metadata.finalizers;
        let persisted = &self.persisted_finalizers;
        let added: Vec<String> = ours.iter().filter(|f| !persisted.contains(*f)).cloned().collect();
        let removed: Vec<String> = persisted.iter().filter(|f| !ours.contains(*f)).cloned().collect();

        let mut metadata = fresh.metadata;
        self.persisted_finalizers = metadata.finalizers.clone();
        metadata.finalizers.retain(|f| !removed.contains(f));
        for f in added {
            if !metadata.finalizers.contains(&f) {
                metadata.finalizers.push(f);
            }
        }
        self.bundle.metadata = metadata;
        Ok(())
    }
}

impl std::fmt::Debug for StatusScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusScope")
            .field("bundle", &self.bundle.metadata.name)
            .field("resource_version", &self.bundle.metadata.resource_version)
            .field("gone", &self.gone)
            .finish()
    }
}
