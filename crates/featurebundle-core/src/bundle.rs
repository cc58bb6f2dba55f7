//! Control resource and parent bundle types.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::feature::{FeatureId, FeatureSummary};
use crate::reference::ObjectRef;

/// Object metadata shared by stored resources.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    /// Optimistic concurrency token, bumped by the store on every write.
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub deletion_timestamp: Option<OffsetDateTime>,
}

impl ObjectMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Target cluster a bundle is deployed onto.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterRef {
    pub namespace: String,
    pub name: String,
}

impl ClusterRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ClusterRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Declarative feature configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleSpec {
    /// Names of the cluster-scoped policy roles to deploy.
    #[serde(default)]
    pub role_refs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_engine: Option<PolicyEngineConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring: Option<MonitoringConfig>,
}

/// Policy-engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyEngineConfig {
    #[serde(default = "default_replicas")]
    pub replicas: u32,
    /// Configuration maps holding the policies to install.
    #[serde(default)]
    pub policy_refs: Vec<ObjectRef>,
}

fn default_replicas() -> u32 {
    1
}

impl Default for PolicyEngineConfig {
    fn default() -> Self {
        Self {
            replicas: default_replicas(),
            policy_refs: Vec::new(),
        }
    }
}

/// How the monitoring stack is installed on the target cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InstallationMode {
    /// Operator only; the user supplies the rest through policy refs.
    #[default]
    Custom,
    /// Operator plus kube-state-metrics and its scrape configuration.
    KubeStateMetrics,
    /// Full kube-prometheus stack.
    KubePrometheus,
}

/// Monitoring stack configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringConfig {
    #[serde(default)]
    pub installation_mode: InstallationMode,
    #[serde(default)]
    pub policy_refs: Vec<ObjectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_quantity: Option<String>,
}

/// Parent resource supplying the declarative configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureBundle {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: BundleSpec,
}

impl FeatureBundle {
    pub fn new(name: impl Into<String>, spec: BundleSpec) -> Self {
        Self {
            metadata: ObjectMeta::new(name),
            spec,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterBundleSpec {
    pub cluster: ClusterRef,
    /// Name of the owning [`FeatureBundle`].
    pub bundle_name: String,
    #[serde(default)]
    pub bundle: BundleSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleStatus {
    /// Naming prefix for policies created on the target cluster; generated once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_prefix: Option<String>,
    #[serde(default)]
    pub feature_summaries: Vec<FeatureSummary>,
}

impl BundleStatus {
    /// First summary recorded for `feature`.
    pub fn feature_summary(&self, feature: FeatureId) -> Option<&FeatureSummary> {
        self.feature_summaries
            .iter()
            .find(|fs| fs.feature_id == feature)
    }
}

/// The control resource: one bundle bound to one target cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterBundle {
    pub metadata: ObjectMeta,
    pub spec: ClusterBundleSpec,
    #[serde(default)]
    pub status: BundleStatus,
}

impl ClusterBundle {
    pub fn new(name: impl Into<String>, spec: ClusterBundleSpec) -> Self {
        Self {
            metadata: ObjectMeta::new(name),
            spec,
            status: BundleStatus::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Returns `true` once deletion was requested.
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.metadata.finalizers.iter().any(|f| f == finalizer)
    }

    /// Adds `finalizer` if missing. Returns `true` if the list changed.
    pub fn add_finalizer(&mut self, finalizer: &str) -> bool {
        if self.has_finalizer(finalizer) {
            return false;
        }
        self.metadata.finalizers.push(finalizer.to_string());
        true
    }

    /// Removes every occurrence of `finalizer`. Returns `true` if the list changed.
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let before = self.metadata.finalizers.len();
        self.metadata.finalizers.retain(|f| f != finalizer);
        before != self.metadata.finalizers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::FeatureStatus;

    fn bundle() -> ClusterBundle {
        ClusterBundle::new(
            "edge-1-bundle",
            ClusterBundleSpec {
                cluster: ClusterRef::new("fleet", "edge-1"),
                bundle_name: "baseline".to_string(),
                bundle: BundleSpec::default(),
            },
        )
    }

    #[test]
    fn test_finalizer_helpers() {
        let mut cb = bundle();
        assert!(!cb.has_finalizer("a"));
        assert!(cb.add_finalizer("a"));
        assert!(!cb.add_finalizer("a"));
        assert_eq!(cb.metadata.finalizers, vec!["a".to_string()]);
        assert!(cb.remove_finalizer("a"));
        assert!(!cb.remove_finalizer("a"));
        assert!(cb.metadata.finalizers.is_empty());
    }

    #[test]
    fn test_first_summary_wins() {
        let mut status = BundleStatus::default();
        status.feature_summaries.push(
            FeatureSummary::new(FeatureId::Roles, FeatureStatus::Provisioned).with_hash(vec![1]),
        );
        status.feature_summaries.push(
            FeatureSummary::new(FeatureId::Roles, FeatureStatus::Failed).with_hash(vec![2]),
        );
        let summary = status.feature_summary(FeatureId::Roles).unwrap();
        assert_eq!(summary.hash, vec![1]);
        assert!(status.feature_summary(FeatureId::Monitoring).is_none());
    }

    #[test]
    fn test_bundle_deserializes_with_defaults() {
        let json = serde_json::json!({
            "metadata": {"name": "cb", "deletionTimestamp": "2026-01-01T00:00:00Z"},
            "spec": {
                "cluster": {"namespace": "fleet", "name": "edge-2"},
                "bundleName": "baseline",
                "bundle": {"policyEngine": {"policyRefs": [
                    {"kind": "ConfigMap", "namespace": "default", "name": "policies"}
                ]}}
            }
        });
        let cb: ClusterBundle = serde_json::from_value(json).unwrap();
        assert!(cb.is_deleting());
        let engine = cb.spec.bundle.policy_engine.unwrap();
        assert_eq!(engine.replicas, 1);
        assert_eq!(engine.policy_refs[0].key(), "ConfigMap-default-policies");
        assert!(cb.status.feature_summaries.is_empty());
    }
}
