//! Reconciliation entry point for one control resource.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use featurebundle_core::{ConfigKind, FeatureId, ObjectRef, generate_policy_prefix};
use featurebundle_storage::DynStore;
use futures_util::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ReconcileSettings;
use crate::deployer::DynDeployer;
use crate::error::ReconcileError;
use crate::features::FeatureTable;
use crate::orchestrator::FeatureOrchestrator;
use crate::references::ReferenceIndex;
use crate::scope::StatusScope;

/// What the caller should do with the control resource next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Done,
    RequeueAfter(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub action: Action,
    /// Features that failed during the pass, in table order.
    pub failed_features: Vec<FeatureId>,
}

impl ReconcileOutcome {
    pub fn done() -> Self {
        Self {
            action: Action::Done,
            failed_features: Vec::new(),
        }
    }

    pub fn requeue_after(delay: Duration, failed_features: Vec<FeatureId>) -> Self {
        Self {
            action: Action::RequeueAfter(delay),
            failed_features,
        }
    }

    pub fn is_done(&self) -> bool {
        self.action == Action::Done
    }

    pub fn requeue_delay(&self) -> Option<Duration> {
        match self.action {
            Action::Done => None,
            Action::RequeueAfter(delay) => Some(delay),
        }
    }
}

/// Stops a pass between features once cancelled or past its deadline.
struct PassGuard<'a> {
    cancel: &'a CancellationToken,
    deadline: Option<(Instant, Duration)>,
}

impl<'a> PassGuard<'a> {
    fn new(cancel: &'a CancellationToken, timeout: Option<Duration>) -> Self {
        Self {
            cancel,
            deadline: timeout.map(|t| (Instant::now() + t, t)),
        }
    }

    fn check(&self) -> Result<(), ReconcileError> {
        if self.cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled);
        }
        if let Some((deadline, timeout)) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(ReconcileError::DeadlineExceeded(timeout));
        }
        Ok(())
    }
}

pub struct Reconciler {
    store: DynStore,
    orchestrator: FeatureOrchestrator,
    index: Arc<ReferenceIndex>,
    features: FeatureTable,
    settings: ReconcileSettings,
}

impl Reconciler {
    pub fn new(store: DynStore, deployer: DynDeployer, index: Arc<ReferenceIndex>) -> Self {
        Self {
            orchestrator: FeatureOrchestrator::new(store.clone(), deployer),
            store,
            index,
            features: FeatureTable::builtin(),
            settings: ReconcileSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ReconcileSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &ReconcileSettings {
        &self.settings
    }

    /// Control resources to requeue when `entry` changes.
    pub fn consumers_of(&self, entry: &ObjectRef) -> HashSet<String> {
        self.index.consumers_of(entry)
    }

    pub fn consumers_for_object(
        &self,
        kind: ConfigKind,
        namespace: Option<&str>,
        name: &str,
    ) -> HashSet<String> {
        let entry = ObjectRef::new(kind, namespace.map(str::to_string), name);
        self.index.consumers_of(&entry)
    }

    /// Runs one reconciliation pass for the control resource `name`.
    ///
    /// Status changes made during the pass are persisted on every exit path,
    /// including a panic inside a feature, which is resumed afterwards.
    pub async fn reconcile(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        info!(bundle = %name, "Reconciling");

        let Some(bundle) = self.store.get(name).await? else {
            debug!(bundle = %name, "Control resource not found; nothing to do");
            return Ok(ReconcileOutcome::done());
        };
        if self.store.get_parent(&bundle).await?.is_none() {
            info!(bundle = %name, parent = %bundle.spec.bundle_name, "Parent bundle not found; nothing to do");
            return Ok(ReconcileOutcome::done());
        }

        let mut scope = StatusScope::new(self.store.clone(), bundle)
            .with_write_retries(self.settings.status_write_retries);
        let guard = PassGuard::new(cancel, self.settings.reconcile_timeout());

        let result = AssertUnwindSafe(self.run_pass(&mut scope, &guard))
            .catch_unwind()
            .await;
        let closed = scope.close().await;

        match result {
            Err(panic) => {
                let panic_msg = if let Some(s) = panic.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                error!(bundle = %name, panic = %panic_msg, "Reconciliation panicked");
                if let Err(err) = closed {
                    error!(bundle = %name, error = %err, "Failed to persist status after panic");
                }
                std::panic::resume_unwind(panic)
            }
            Ok(Ok(outcome)) => {
                closed?;
                Ok(outcome)
            }
            Ok(Err(err)) => {
                if let Err(close_err) = closed {
                    error!(bundle = %name, error = %close_err, "Failed to persist status");
                }
                Err(err)
            }
        }
    }

    async fn run_pass(
        &self,
        scope: &mut StatusScope,
        guard: &PassGuard<'_>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        if scope.is_deleting() {
            self.reconcile_delete(scope, guard).await
        } else {
            self.reconcile_normal(scope, guard).await
        }
    }

    async fn reconcile_normal(
        &self,
        scope: &mut StatusScope,
        guard: &PassGuard<'_>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        if !scope.has_finalizer() {
            scope.add_finalizer();
            if let Err(err) = scope.patch_object().await {
                error!(bundle = %scope.name(), error = %err, "Failed to add finalizer");
                return Err(err);
            }
        }

        if scope.policy_prefix().is_none() {
            let prefix = generate_policy_prefix();
            debug!(bundle = %scope.name(), prefix = %prefix, "Generated policy prefix");
            scope.set_policy_prefix(prefix);
        }

        self.index
            .update_references(scope.name(), self.features.all_references(scope.spec()));

        let mut failed = Vec::new();
        for feature in self.features.iter() {
            guard.check()?;
            if let Err(err) = self.orchestrator.deploy(scope, feature.as_ref()).await {
                debug!(bundle = %scope.name(), feature = %feature.id(), error = %err, "Feature failed");
                failed.push(feature.id());
            }
        }

        if !failed.is_empty() {
            let delay = self.settings.normal_requeue_after();
            warn!(bundle = %scope.name(), failed = ?failed, requeue_after = ?delay, "Some features failed; requeueing");
            return Ok(ReconcileOutcome::requeue_after(delay, failed));
        }

        info!(bundle = %scope.name(), "Reconciliation succeeded");
        Ok(ReconcileOutcome::done())
    }

    async fn reconcile_delete(
        &self,
        scope: &mut StatusScope,
        guard: &PassGuard<'_>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        info!(bundle = %scope.name(), "Reconciling deletion");

        if !scope.has_finalizer() {
            self.index.remove_consumer(scope.name());
            return Ok(ReconcileOutcome::done());
        }

        let mut failed = Vec::new();
        if self.store.cluster_exists(scope.cluster()).await? {
            for feature in self.features.iter() {
                guard.check()?;
                let id = feature.id();
                if !feature.is_configured(scope.spec()) && scope.feature_summary(id).is_none() {
                    continue;
                }
                if let Err(err) = self.orchestrator.undeploy(scope, feature.as_ref()).await {
                    debug!(bundle = %scope.name(), feature = %id, error = %err, "Feature undeploy failed");
                    failed.push(id);
                }
            }
        } else {
            info!(bundle = %scope.name(), cluster = %scope.cluster(), "Target cluster gone; skipping undeploy");
            for feature in self.features.iter() {
                scope.remove_feature_summary(feature.id());
            }
        }

        if !failed.is_empty() {
            let delay = self.settings.delete_requeue_after();
            warn!(bundle = %scope.name(), failed = ?failed, requeue_after = ?delay, "Undeploy failed; keeping finalizer");
            return Ok(ReconcileOutcome::requeue_after(delay, failed));
        }

        scope.remove_finalizer();
        self.index.remove_consumer(scope.name());
        info!(bundle = %scope.name(), "Cleanup finished; finalizer removed");
        Ok(ReconcileOutcome::done())
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("backend", &self.store.backend_name())
            .field("features", &self.features.iter().count())
            .field("settings", &self.settings)
            .finish()
    }
}
