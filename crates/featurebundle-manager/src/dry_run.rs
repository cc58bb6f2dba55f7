use async_trait::async_trait;
use featurebundle_controller::{DeployError, DeployOutcome, DeployRequest, Deployer};
use tracing::info;

/// Deployer that touches no cluster: it logs each request and reports the
/// feature's managed kinds as deployed.
#[derive(Debug, Default)]
pub struct DryRunDeployer;

#[async_trait]
impl Deployer for DryRunDeployer {
    async fn deploy(&self, request: &DeployRequest) -> Result<DeployOutcome, DeployError> {
        info!(
            cluster = %request.cluster,
            bundle = %request.consumer,
            feature = %request.feature,
            prefix = request.policy_prefix.as_deref().unwrap_or(""),
            references = request.payload.references.len(),
            "[dry-run] deploy"
        );
        Ok(DeployOutcome::new(request.payload.managed_kinds.clone()))
    }

    async fn undeploy(&self, request: &DeployRequest) -> Result<(), DeployError> {
        info!(
            cluster = %request.cluster,
            bundle = %request.consumer,
            feature = %request.feature,
            "[dry-run] undeploy"
        );
        Ok(())
    }
}
