use featurebundle_core::{BundleSpec, FeatureId, ObjectRef, ResourceKind};
use serde_json::json;

use super::Feature;

/// Policy engine installation plus the policies held in its referenced maps.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyEngineFeature;

impl Feature for PolicyEngineFeature {
    fn id(&self) -> FeatureId {
        FeatureId::PolicyEngine
    }

    fn is_configured(&self, spec: &BundleSpec) -> bool {
        spec.policy_engine.is_some()
    }

    fn references(&self, spec: &BundleSpec) -> Vec<ObjectRef> {
        spec.policy_engine
            .as_ref()
            .map(|pe| pe.policy_refs.clone())
            .unwrap_or_default()
    }

    fn settings(&self, spec: &BundleSpec) -> serde_json::Value {
        match &spec.policy_engine {
            Some(pe) => json!({ "replicas": pe.replicas }),
            None => serde_json::Value::Null,
        }
    }

    fn managed_kinds(&self, _spec: &BundleSpec) -> Vec<ResourceKind> {
        vec![
            ResourceKind::new("apps", "v1", "Deployment"),
            ResourceKind::new("kyverno.io", "v1", "ClusterPolicy"),
            ResourceKind::new("kyverno.io", "v1", "Policy"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use featurebundle_core::PolicyEngineConfig;

    #[test]
    fn test_replicas_participate_in_settings() {
        let mut spec = BundleSpec {
            policy_engine: Some(PolicyEngineConfig::default()),
            ..BundleSpec::default()
        };
        assert_eq!(PolicyEngineFeature.settings(&spec), json!({"replicas": 1}));

        spec.policy_engine.as_mut().unwrap().replicas = 3;
        assert_eq!(PolicyEngineFeature.settings(&spec), json!({"replicas": 3}));
        assert!(PolicyEngineFeature.settings(&BundleSpec::default()).is_null());
    }
}
