use featurebundle_core::{BundleSpec, FeatureId, InstallationMode, ObjectRef, ResourceKind};
use serde_json::json;

use super::Feature;

/// Storage requested for the metrics volume when a storage class is set
/// without an explicit quantity.
pub const DEFAULT_STORAGE_QUANTITY: &str = "40000000";

/// Monitoring stack in one of its installation modes.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonitoringFeature;

impl Feature for MonitoringFeature {
    fn id(&self) -> FeatureId {
        FeatureId::Monitoring
    }

    fn is_configured(&self, spec: &BundleSpec) -> bool {
        spec.monitoring.is_some()
    }

    fn references(&self, spec: &BundleSpec) -> Vec<ObjectRef> {
        spec.monitoring
            .as_ref()
            .map(|m| m.policy_refs.clone())
            .unwrap_or_default()
    }

    fn settings(&self, spec: &BundleSpec) -> serde_json::Value {
        let Some(m) = &spec.monitoring else {
            return serde_json::Value::Null;
        };
        let storage = m
            .storage_class_name
            .as_deref()
            .filter(|class| !class.is_empty())
            .map(|class| {
                json!({
                    "storageClassName": class,
                    "quantity": m.storage_quantity.as_deref().unwrap_or(DEFAULT_STORAGE_QUANTITY),
                })
            });
        json!({
            "installationMode": m.installation_mode,
            "storage": storage,
        })
    }

    fn managed_kinds(&self, spec: &BundleSpec) -> Vec<ResourceKind> {
        let mut kinds = vec![
            ResourceKind::new("monitoring.coreos.com", "v1", "Prometheus"),
            ResourceKind::new("monitoring.coreos.com", "v1", "ServiceMonitor"),
        ];
        match spec.monitoring.as_ref().map(|m| m.installation_mode) {
            Some(InstallationMode::KubeStateMetrics) => {
                kinds.push(ResourceKind::new("apps", "v1", "Deployment"));
            }
            Some(InstallationMode::KubePrometheus) => {
                kinds.push(ResourceKind::new("apps", "v1", "Deployment"));
                kinds.push(ResourceKind::new("apps", "v1", "DaemonSet"));
                kinds.push(ResourceKind::new("monitoring.coreos.com", "v1", "Alertmanager"));
            }
            Some(InstallationMode::Custom) | None => {}
        }
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use featurebundle_core::MonitoringConfig;

    fn spec(config: MonitoringConfig) -> BundleSpec {
        BundleSpec {
            monitoring: Some(config),
            ..BundleSpec::default()
        }
    }

    #[test]
    fn test_storage_defaults_only_with_class() {
        let without_class = spec(MonitoringConfig {
            storage_quantity: Some("1Gi".into()),
            ..MonitoringConfig::default()
        });
        assert!(MonitoringFeature.settings(&without_class)["storage"].is_null());

        let with_class = spec(MonitoringConfig {
            storage_class_name: Some("standard".into()),
            ..MonitoringConfig::default()
        });
        let settings = MonitoringFeature.settings(&with_class);
        assert_eq!(settings["storage"]["quantity"], DEFAULT_STORAGE_QUANTITY);
        assert_eq!(settings["installationMode"], "Custom");
    }

    #[test]
    fn test_kinds_follow_installation_mode() {
        let custom = spec(MonitoringConfig::default());
        assert_eq!(MonitoringFeature.managed_kinds(&custom).len(), 2);

        let full = spec(MonitoringConfig {
            installation_mode: InstallationMode::KubePrometheus,
            ..MonitoringConfig::default()
        });
        let kinds: Vec<String> = MonitoringFeature
            .managed_kinds(&full)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert!(kinds.contains(&"Alertmanager.v1.monitoring.coreos.com".to_string()));
    }
}
