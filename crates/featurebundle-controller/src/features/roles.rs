use featurebundle_core::{BundleSpec, FeatureId, ObjectRef, ResourceKind};

use super::Feature;

/// Role policies: one cluster role or namespaced role per referenced
/// policy role object.
#[derive(Debug, Clone, Copy, Default)]
pub struct RolesFeature;

impl Feature for RolesFeature {
    fn id(&self) -> FeatureId {
        FeatureId::Roles
    }

    // Always deployed, so roles dropped from the bundle spec get cleaned up on the
    // cluster by the next deploy.
    fn is_configured(&self, _spec: &BundleSpec) -> bool {
        true
    }

    fn references(&self, spec: &BundleSpec) -> Vec<ObjectRef> {
        spec.role_refs.iter().map(ObjectRef::policy_role).collect()
    }

    fn settings(&self, _spec: &BundleSpec) -> serde_json::Value {
        serde_json::Value::Null
    }

    fn managed_kinds(&self, _spec: &BundleSpec) -> Vec<ResourceKind> {
        vec![
            ResourceKind::new("rbac.authorization.k8s.io", "v1", "ClusterRole"),
            ResourceKind::new("rbac.authorization.k8s.io", "v1", "Role"),
        ]
    }
}
