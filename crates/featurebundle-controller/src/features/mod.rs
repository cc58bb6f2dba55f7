//! Feature table.
//!
//! Every deployable capability is one [`Feature`] implementation; the table
//! lists them in deployment order.

mod monitoring;
mod policy_engine;
mod roles;

use std::sync::Arc;

use featurebundle_core::{BundleSpec, FeatureId, ObjectRef, ResourceKind};

use crate::deployer::FeaturePayload;

pub use monitoring::MonitoringFeature;
pub use policy_engine::PolicyEngineFeature;
pub use roles::RolesFeature;

/// One independently deployable capability.
pub trait Feature: Send + Sync + std::fmt::Debug {
    fn id(&self) -> FeatureId;

    /// Returns `true` if `spec` declares this feature.
    fn is_configured(&self, spec: &BundleSpec) -> bool;

    /// Configuration objects this feature reads from the store.
    fn references(&self, spec: &BundleSpec) -> Vec<ObjectRef>;

    /// Feature-level settings that participate in the content hash.
    fn settings(&self, spec: &BundleSpec) -> serde_json::Value;

    fn managed_kinds(&self, spec: &BundleSpec) -> Vec<ResourceKind>;

    fn payload(&self, spec: &BundleSpec) -> FeaturePayload {
        FeaturePayload {
            references: self.references(spec),
            settings: self.settings(spec),
            managed_kinds: self.managed_kinds(spec),
        }
    }
}

pub type DynFeature = Arc<dyn Feature>;

/// Ordered set of features a reconciler drives.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    features: Vec<DynFeature>,
}

impl FeatureTable {
    /// Roles, policy engine and monitoring, in that order.
    pub fn builtin() -> Self {
        Self {
            features: vec![
                Arc::new(RolesFeature),
                Arc::new(PolicyEngineFeature),
                Arc::new(MonitoringFeature),
            ],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &DynFeature> {
        self.features.iter()
    }

    /// Union of the references of every configured feature.
    pub fn all_references(&self, spec: &BundleSpec) -> Vec<ObjectRef> {
        let mut refs: Vec<ObjectRef> = self
            .features
            .iter()
            .filter(|f| f.is_configured(spec))
            .flat_map(|f| f.references(spec))
            .collect();
        refs.sort();
        refs.dedup();
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use featurebundle_core::{InstallationMode, MonitoringConfig, PolicyEngineConfig};

    fn full_spec() -> BundleSpec {
        BundleSpec {
            role_refs: vec!["viewer".into(), "editor".into()],
            policy_engine: Some(PolicyEngineConfig {
                replicas: 3,
                policy_refs: vec![ObjectRef::config_map("default", "policies")],
            }),
            monitoring: Some(MonitoringConfig {
                installation_mode: InstallationMode::KubePrometheus,
                policy_refs: vec![
                    ObjectRef::config_map("default", "dashboards"),
                    ObjectRef::config_map("default", "policies"),
                ],
                storage_class_name: Some("standard".into()),
                storage_quantity: None,
            }),
        }
    }

    #[test]
    fn test_builtin_order() {
        let table = FeatureTable::builtin();
        let ids: Vec<FeatureId> = table.iter().map(|f| f.id()).collect();
        assert_eq!(ids, FeatureId::all().to_vec());
    }

    #[test]
    fn test_configuration_detection() {
        let table = FeatureTable::builtin();
        let empty = BundleSpec::default();
        let configured: Vec<FeatureId> = table
            .iter()
            .filter(|f| f.is_configured(&empty))
            .map(|f| f.id())
            .collect();
        assert_eq!(configured, vec![FeatureId::Roles]);

        let spec = full_spec();
        assert!(table.iter().all(|f| f.is_configured(&spec)));
    }

    #[test]
    fn test_all_references_are_deduplicated() {
        let refs = FeatureTable::builtin().all_references(&full_spec());
        let keys: Vec<String> = refs.iter().map(ObjectRef::key).collect();
        assert_eq!(
            keys,
            vec![
                "PolicyRole-editor",
                "PolicyRole-viewer",
                "ConfigMap-default-dashboards",
                "ConfigMap-default-policies",
            ]
        );
    }
}
