//! In-memory resource store.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use featurebundle_core::{
    BundleStatus, ClusterBundle, ClusterRef, ConfigObject, FeatureBundle, ObjectRef,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StoreError;
use crate::traits::ResourceStore;

const BUNDLE_KIND: &str = "ClusterBundle";

/// Serializable content of an [`InMemoryStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    #[serde(default)]
    pub bundles: Vec<ClusterBundle>,
    #[serde(default)]
    pub parents: Vec<FeatureBundle>,
    #[serde(default)]
    pub config_objects: Vec<ConfigObject>,
    #[serde(default)]
    pub clusters: Vec<ClusterRef>,
}

#[derive(Debug, Default)]
struct State {
    bundles: HashMap<String, ClusterBundle>,
    parents: HashMap<String, FeatureBundle>,
    config_objects: HashMap<ObjectRef, ConfigObject>,
    clusters: HashSet<ClusterRef>,
}

/// In-memory resource store.
///
/// Every write bumps the resource version from a store-wide counter, so
/// optimistic concurrency behaves like a real backend. Removing the last
/// finalizer of a bundle marked for deletion deletes it.
#[derive(Debug)]
pub struct InMemoryStore {
    state: RwLock<State>,
    version_counter: AtomicU64,
    status_patches: AtomicU64,
    failing_status_patches: AtomicU32,
    conflicting_status_patches: AtomicU32,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            version_counter: AtomicU64::new(1),
            status_patches: AtomicU64::new(0),
            failing_status_patches: AtomicU32::new(0),
            conflicting_status_patches: AtomicU32::new(0),
        }
    }

    /// Creates a store pre-populated from a snapshot.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidResource` for an unnamed parent or
    /// control resource, or a control resource without a parent name.
    pub async fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self, StoreError> {
        if snapshot.parents.iter().any(|p| p.metadata.name.is_empty()) {
            return Err(StoreError::invalid_resource("parent bundle without a name"));
        }
        for bundle in &snapshot.bundles {
            if bundle.metadata.name.is_empty() {
                return Err(StoreError::invalid_resource("control resource without a name"));
            }
            if bundle.spec.bundle_name.is_empty() {
                return Err(StoreError::invalid_resource(format!(
                    "control resource {} does not name its parent bundle",
                    bundle.metadata.name
                )));
            }
        }

        let store = Self::new();
        for parent in snapshot.parents {
            store.insert_parent(parent).await;
        }
        for object in snapshot.config_objects {
            store.put_config_object(object).await;
        }
        for cluster in snapshot.clusters {
            store.add_cluster(cluster).await;
        }
        for bundle in snapshot.bundles {
            store.insert_bundle(bundle).await;
        }
        Ok(store)
    }

    /// Exports the current content.
    pub async fn snapshot(&self) -> StoreSnapshot {
        let state = self.state.read().await;
        let mut bundles: Vec<_> = state.bundles.values().cloned().collect();
        bundles.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        let mut parents: Vec<_> = state.parents.values().cloned().collect();
        parents.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        let mut config_objects: Vec<_> = state.config_objects.values().cloned().collect();
        config_objects.sort_by_key(ConfigObject::reference);
        let mut clusters: Vec<_> = state.clusters.iter().cloned().collect();
        clusters.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
        StoreSnapshot {
            bundles,
            parents,
            config_objects,
            clusters,
        }
    }

    fn next_version(&self) -> u64 {
        self.version_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Inserts or replaces a control resource, assigning a fresh version.
    pub async fn insert_bundle(&self, mut bundle: ClusterBundle) -> u64 {
        let version = self.next_version();
        bundle.metadata.resource_version = version;
        self.state
            .write()
            .await
            .bundles
            .insert(bundle.metadata.name.clone(), bundle);
        version
    }

    pub async fn insert_parent(&self, parent: FeatureBundle) {
        self.state
            .write()
            .await
            .parents
            .insert(parent.metadata.name.clone(), parent);
    }

    pub async fn remove_parent(&self, name: &str) -> bool {
        self.state.write().await.parents.remove(name).is_some()
    }

    /// Inserts or replaces a shared configuration object.
    pub async fn put_config_object(&self, object: ConfigObject) {
        self.state
            .write()
            .await
            .config_objects
            .insert(object.reference(), object);
    }

    pub async fn remove_config_object(&self, reference: &ObjectRef) -> bool {
        self.state
            .write()
            .await
            .config_objects
            .remove(reference)
            .is_some()
    }

    pub async fn add_cluster(&self, cluster: ClusterRef) {
        self.state.write().await.clusters.insert(cluster);
    }

    pub async fn remove_cluster(&self, cluster: &ClusterRef) -> bool {
        self.state.write().await.clusters.remove(cluster)
    }

    /// Marks a control resource for deletion.
    ///
    /// A resource without finalizers is removed right away. Returns `false`
    /// if no such resource exists.
    pub async fn request_deletion(&self, name: &str) -> bool {
        let version = self.next_version();
        let mut state = self.state.write().await;
        let Some(bundle) = state.bundles.get_mut(name) else {
            return false;
        };
        if bundle.metadata.finalizers.is_empty() {
            state.bundles.remove(name);
            return true;
        }
        if bundle.metadata.deletion_timestamp.is_none() {
            bundle.metadata.deletion_timestamp = Some(OffsetDateTime::now_utc());
            bundle.metadata.resource_version = version;
        }
        true
    }

    /// Bumps the version of a control resource, as a concurrent writer would.
    pub async fn touch(&self, name: &str) -> Option<u64> {
        let version = self.next_version();
        let mut state = self.state.write().await;
        let bundle = state.bundles.get_mut(name)?;
        bundle.metadata.resource_version = version;
        Some(version)
    }

    /// Replaces the spec of a control resource, bumping its version.
    pub async fn update_bundle_spec(
        &self,
        name: &str,
        spec: featurebundle_core::ClusterBundleSpec,
    ) -> bool {
        let version = self.next_version();
        let mut state = self.state.write().await;
        let Some(bundle) = state.bundles.get_mut(name) else {
            return false;
        };
        bundle.spec = spec;
        bundle.metadata.resource_version = version;
        true
    }

    /// Makes the next `count` status patches fail with a connection error.
    pub fn fail_next_status_patches(&self, count: u32) {
        self.failing_status_patches.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` status patches lose a race against a
    /// concurrent writer: the stored version is bumped before the check.
    pub fn conflict_next_status_patches(&self, count: u32) {
        self.conflicting_status_patches.store(count, Ordering::SeqCst);
    }

    /// Number of successful status patches so far.
    pub fn status_patch_count(&self) -> u64 {
        self.status_patches.load(Ordering::SeqCst)
    }

    /// Names of all stored control resources, sorted.
    pub async fn bundle_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.state.read().await.bundles.keys().cloned().collect();
        names.sort();
        names
    }

    fn take_injected_failure(&self) -> bool {
        take_one(&self.failing_status_patches)
    }

    fn take_injected_conflict(&self) -> bool {
        take_one(&self.conflicting_status_patches)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn check_version(bundle: &ClusterBundle, expected: u64) -> Result<(), StoreError> {
    if bundle.metadata.resource_version != expected {
        return Err(StoreError::version_conflict(
            &bundle.metadata.name,
            expected,
            bundle.metadata.resource_version,
        ));
    }
    Ok(())
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn get(&self, name: &str) -> Result<Option<ClusterBundle>, StoreError> {
        Ok(self.state.read().await.bundles.get(name).cloned())
    }

    async fn get_parent(&self, bundle: &ClusterBundle) -> Result<Option<FeatureBundle>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .parents
            .get(&bundle.spec.bundle_name)
            .cloned())
    }

    async fn patch_status(
        &self,
        name: &str,
        status: &BundleStatus,
        expected_version: u64,
    ) -> Result<ClusterBundle, StoreError> {
        if self.take_injected_failure() {
            return Err(StoreError::connection_error("injected status patch failure"));
        }
        let version = self.next_version();
        let mut state = self.state.write().await;
        let bundle = state
            .bundles
            .get_mut(name)
            .ok_or_else(|| StoreError::not_found(BUNDLE_KIND, name))?;
        if self.take_injected_conflict() {
            bundle.metadata.resource_version = version;
            return Err(StoreError::version_conflict(name, expected_version, version));
        }
        check_version(bundle, expected_version)?;
        bundle.status = status.clone();
        bundle.metadata.resource_version = version;
        self.status_patches.fetch_add(1, Ordering::SeqCst);
        debug!(bundle = %name, version, "Status patched");
        Ok(bundle.clone())
    }

    async fn patch_finalizers(
        &self,
        name: &str,
        finalizers: &[String],
        expected_version: u64,
    ) -> Result<Option<ClusterBundle>, StoreError> {
        let version = self.next_version();
        let mut state = self.state.write().await;
        let bundle = state
            .bundles
            .get_mut(name)
            .ok_or_else(|| StoreError::not_found(BUNDLE_KIND, name))?;
        check_version(bundle, expected_version)?;
        bundle.metadata.finalizers = finalizers.to_vec();
        bundle.metadata.resource_version = version;
        if bundle.is_deleting() && finalizers.is_empty() {
            state.bundles.remove(name);
            debug!(bundle = %name, "Last finalizer removed, bundle deleted");
            return Ok(None);
        }
        Ok(Some(bundle.clone()))
    }

    async fn get_config_object(
        &self,
        reference: &ObjectRef,
    ) -> Result<Option<ConfigObject>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .config_objects
            .get(reference)
            .cloned())
    }

    async fn cluster_exists(&self, cluster: &ClusterRef) -> Result<bool, StoreError> {
        Ok(self.state.read().await.clusters.contains(cluster))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
