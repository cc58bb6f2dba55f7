//! Per-feature deploy/undeploy state machine.

use featurebundle_core::FeatureStatus;
use featurebundle_storage::DynStore;
use tracing::{debug, info, warn};

use crate::deployer::{DeployRequest, DynDeployer};
use crate::error::ReconcileError;
use crate::features::Feature;
use crate::hash::ChangeDetector;
use crate::scope::StatusScope;

/// Failure reason recorded when a feature's inputs could not be read.
pub const HASH_FAILURE_REASON: &str = "ConfigurationUnavailable";

/// What happened to one feature during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureAction {
    /// Not declared in the bundle spec.
    Skipped,
    /// Already provisioned with the same content hash.
    Unchanged,
    Deployed,
    Undeployed,
}

#[derive(Clone)]
pub struct FeatureOrchestrator {
    deployer: DynDeployer,
    detector: ChangeDetector,
}

impl FeatureOrchestrator {
    pub fn new(store: DynStore, deployer: DynDeployer) -> Self {
        Self {
            deployer,
            detector: ChangeDetector::new(store),
        }
    }

    /// Brings `feature` to the state its spec describes, recording the
    /// result in `scope`.
    ///
    /// # Errors
    ///
    /// The error has already been recorded in the feature summary when this
    /// returns; callers only aggregate it.
    pub async fn deploy(
        &self,
        scope: &mut StatusScope,
        feature: &dyn Feature,
    ) -> Result<FeatureAction, ReconcileError> {
        let id = feature.id();
        let spec = scope.spec().clone();
        if !feature.is_configured(&spec) {
            debug!(bundle = %scope.name(), feature = %id, "Feature not configured");
            return Ok(FeatureAction::Skipped);
        }

        let previous = scope.feature_summary(id).cloned();
        let previous_hash = previous.as_ref().map(|fs| fs.hash.clone()).unwrap_or_default();

        let current_hash = match self.detector.compute_hash(feature, &spec).await {
            Ok(hash) => hash,
            Err(err) => {
                warn!(bundle = %scope.name(), feature = %id, error = %err, "Failed to hash feature inputs");
                scope.set_feature_status(id, FeatureStatus::Failed, previous_hash);
                scope.set_failure_message(id, Some(err.to_string()));
                scope.set_failure_reason(id, Some(HASH_FAILURE_REASON.to_string()));
                return Err(err);
            }
        };

        if let Some(fs) = &previous
            && fs.is_provisioned()
            && fs.hash == current_hash
        {
            debug!(bundle = %scope.name(), feature = %id, "Feature unchanged; skipping deploy");
            return Ok(FeatureAction::Unchanged);
        }

        scope.set_feature_status(id, FeatureStatus::Provisioning, previous_hash.clone());
        let request = Self::request(scope, feature);
        info!(bundle = %scope.name(), feature = %id, cluster = %request.cluster, "Deploying feature");

        match self.deployer.deploy(&request).await {
            Ok(outcome) => {
                scope.set_feature_status(id, FeatureStatus::Provisioned, current_hash);
                scope.set_failure_message(id, None);
                scope.set_failure_reason(id, None);
                scope.set_deployed_kinds(id, &outcome.deployed_kinds);
                info!(
                    bundle = %scope.name(),
                    feature = %id,
                    kinds = outcome.deployed_kinds.len(),
                    "Feature provisioned"
                );
                Ok(FeatureAction::Deployed)
            }
            Err(err) => {
                warn!(bundle = %scope.name(), feature = %id, reason = err.kind.label(), error = %err, "Feature deploy failed");
                scope.set_feature_status(id, FeatureStatus::Failed, previous_hash);
                scope.set_failure_message(id, Some(err.message.clone()));
                scope.set_failure_reason(id, Some(err.kind.label().to_string()));
                Err(ReconcileError::feature(id, err))
            }
        }
    }

    /// Removes `feature` from the target cluster and drops its summary.
    ///
    /// A target cluster that no longer exists counts as success.
    pub async fn undeploy(
        &self,
        scope: &mut StatusScope,
        feature: &dyn Feature,
    ) -> Result<FeatureAction, ReconcileError> {
        let id = feature.id();
        let request = Self::request(scope, feature);
        info!(bundle = %scope.name(), feature = %id, cluster = %request.cluster, "Undeploying feature");

        match self.deployer.undeploy(&request).await {
            Ok(()) => {}
            Err(err) if err.is_cluster_not_found() => {
                info!(bundle = %scope.name(), feature = %id, "Target cluster gone; nothing to undeploy");
            }
            Err(err) => {
                warn!(bundle = %scope.name(), feature = %id, reason = err.kind.label(), error = %err, "Feature undeploy failed");
                let previous_hash = scope
                    .feature_summary(id)
                    .map(|fs| fs.hash.clone())
                    .unwrap_or_default();
                scope.set_feature_status(id, FeatureStatus::Failed, previous_hash);
                scope.set_failure_message(id, Some(err.message.clone()));
                scope.set_failure_reason(id, Some(err.kind.label().to_string()));
                return Err(ReconcileError::feature(id, err));
            }
        }
        scope.remove_feature_summary(id);
        Ok(FeatureAction::Undeployed)
    }

    fn request(scope: &StatusScope, feature: &dyn Feature) -> DeployRequest {
        DeployRequest {
            cluster: scope.cluster().clone(),
            consumer: scope.name().to_string(),
            feature: feature.id(),
            policy_prefix: scope.policy_prefix().map(str::to_string),
            payload: feature.payload(scope.spec()),
        }
    }
}

impl std::fmt::Debug for FeatureOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureOrchestrator")
            .field("detector", &self.detector)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use featurebundle_core::{
        BundleSpec, ClusterBundle, ClusterBundleSpec, ClusterRef, FeatureId, ResourceKind,
    };
    use featurebundle_storage::{InMemoryStore, ResourceStore};
    use parking_lot::Mutex;

    use super::*;
    use crate::deployer::{DeployOutcome, Deployer};
    use crate::error::DeployError;
    use crate::features::{PolicyEngineFeature, RolesFeature};

    #[derive(Default)]
    struct ScriptedDeployer {
        deploys: AtomicU32,
        undeploys: AtomicU32,
        next_error: Mutex<Option<DeployError>>,
    }

    #[async_trait]
    impl Deployer for ScriptedDeployer {
        async fn deploy(&self, _request: &DeployRequest) -> Result<DeployOutcome, DeployError> {
            self.deploys.fetch_add(1, Ordering::SeqCst);
            match self.next_error.lock().take() {
                Some(err) => Err(err),
                None => Ok(DeployOutcome::new(vec![ResourceKind::new(
                    "rbac.authorization.k8s.io",
                    "v1",
                    "ClusterRole",
                )])),
            }
        }

        async fn undeploy(&self, _request: &DeployRequest) -> Result<(), DeployError> {
            self.undeploys.fetch_add(1, Ordering::SeqCst);
            match self.next_error.lock().take() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    async fn setup() -> (Arc<ScriptedDeployer>, FeatureOrchestrator, StatusScope) {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert_bundle(ClusterBundle::new(
                "cb",
                ClusterBundleSpec {
                    cluster: ClusterRef::new("fleet", "edge-1"),
                    bundle_name: "baseline".into(),
                    bundle: BundleSpec {
                        role_refs: vec!["viewer".into()],
                        ..BundleSpec::default()
                    },
                },
            ))
            .await;
        let bundle = store.get("cb").await.unwrap().unwrap();
        let deployer = Arc::new(ScriptedDeployer::default());
        let orchestrator = FeatureOrchestrator::new(store.clone(), deployer.clone());
        let scope = StatusScope::new(store, bundle);
        (deployer, orchestrator, scope)
    }

    #[tokio::test]
    async fn test_deploy_then_unchanged() {
        let (deployer, orchestrator, mut scope) = setup().await;

        let action = orchestrator.deploy(&mut scope, &RolesFeature).await.unwrap();
        assert_eq!(action, FeatureAction::Deployed);
        let fs = scope.feature_summary(FeatureId::Roles).unwrap();
        assert_eq!(fs.status, FeatureStatus::Provisioned);
        assert_eq!(fs.hash.len(), 32);
        assert_eq!(fs.deployed_kinds, vec!["ClusterRole.v1.rbac.authorization.k8s.io"]);

        let action = orchestrator.deploy(&mut scope, &RolesFeature).await.unwrap();
        assert_eq!(action, FeatureAction::Unchanged);
        assert_eq!(deployer.deploys.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_feature_is_skipped() {
        let (deployer, orchestrator, mut scope) = setup().await;
        let action = orchestrator
            .deploy(&mut scope, &PolicyEngineFeature)
            .await
            .unwrap();
        assert_eq!(action, FeatureAction::Skipped);
        assert!(scope.feature_summary(FeatureId::PolicyEngine).is_none());
        assert_eq!(deployer.deploys.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_deploy_keeps_previous_hash() {
        let (deployer, orchestrator, mut scope) = setup().await;
        scope.set_feature_status(FeatureId::Roles, FeatureStatus::Failed, vec![9, 9]);
        *deployer.next_error.lock() = Some(DeployError::unreachable("connection refused"));

        let err = orchestrator.deploy(&mut scope, &RolesFeature).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Feature { feature: FeatureId::Roles, .. }));

        let fs = scope.feature_summary(FeatureId::Roles).unwrap();
        assert_eq!(fs.status, FeatureStatus::Failed);
        assert_eq!(fs.hash, vec![9, 9]);
        assert_eq!(fs.failure_message.as_deref(), Some("connection refused"));
        assert_eq!(fs.failure_reason.as_deref(), Some("ClusterUnreachable"));

        // the next successful deploy clears the failure fields
        orchestrator.deploy(&mut scope, &RolesFeature).await.unwrap();
        let fs = scope.feature_summary(FeatureId::Roles).unwrap();
        assert_eq!(fs.status, FeatureStatus::Provisioned);
        assert_eq!(fs.failure_message, None);
        assert_eq!(fs.failure_reason, None);
    }

    #[tokio::test]
    async fn test_undeploy_tolerates_missing_cluster() {
        let (deployer, orchestrator, mut scope) = setup().await;
        orchestrator.deploy(&mut scope, &RolesFeature).await.unwrap();
        *deployer.next_error.lock() = Some(DeployError::cluster_not_found("no such cluster"));

        let action = orchestrator.undeploy(&mut scope, &RolesFeature).await.unwrap();
        assert_eq!(action, FeatureAction::Undeployed);
        assert!(scope.feature_summary(FeatureId::Roles).is_none());
    }

    #[tokio::test]
    async fn test_failed_undeploy_keeps_summary() {
        let (deployer, orchestrator, mut scope) = setup().await;
        orchestrator.deploy(&mut scope, &RolesFeature).await.unwrap();
        *deployer.next_error.lock() = Some(DeployError::rejected("forbidden"));

        orchestrator.undeploy(&mut scope, &RolesFeature).await.unwrap_err();
        let fs = scope.feature_summary(FeatureId::Roles).unwrap();
        assert_eq!(fs.status, FeatureStatus::Failed);
        assert_eq!(fs.hash.len(), 32);
        assert_eq!(fs.failure_reason.as_deref(), Some("ManifestRejected"));
        assert_eq!(deployer.undeploys.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_undeploy_of_undeployed_feature_is_marked_failed() {
        let (deployer, orchestrator, mut scope) = setup().await;
        *deployer.next_error.lock() = Some(DeployError::unreachable("down"));

        orchestrator.undeploy(&mut scope, &RolesFeature).await.unwrap_err();
        let fs = scope.feature_summary(FeatureId::Roles).unwrap();
        assert_eq!(fs.status, FeatureStatus::Failed);
        assert!(fs.hash.is_empty());
        assert_eq!(fs.failure_message.as_deref(), Some("down"));
    }
}
